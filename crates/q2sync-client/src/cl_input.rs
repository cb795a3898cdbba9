// cl_input.rs -- builds the outgoing command ring
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2 or later.

use q2sync_common::q_shared::UserCmd;

use crate::client::*;

/// Milliseconds of movement a command carries for a frame of `frametime`
/// seconds. Long hitches are sent as a regular 100 msec step.
pub fn cl_msec_for_frametime(frametime: f32) -> u8 {
    let ms = (frametime * 1000.0) as i32;
    let ms = if ms > 250 { 100 } else { ms };
    ms.max(0) as u8
}

/// Save `cmd` for prediction under the current outgoing sequence and advance
/// the sequence. Returns the sequence the command went out as.
pub fn cl_queue_cmd(cl: &mut ClientState, cls: &mut ClientStatic, cmd: UserCmd) -> i32 {
    let sequence = cls.netchan.outgoing_sequence;

    // save this command off for prediction
    let i = (sequence as usize) & CMD_MASK;
    cl.cmds[i] = cmd;
    cl.cmd_time[i] = cls.realtime;

    cls.netchan.outgoing_sequence = sequence.wrapping_add(1);
    sequence
}
