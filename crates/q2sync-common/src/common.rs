// common.rs -- message reading and writing
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2 or later.
//
// All values are little-endian. Reads never run past `cursize`: a read that
// would fails with `EndOfMessage` and leaves `readcount` where it was.

use crate::error::{ProtocolError, Result};
use crate::q_shared::*;
use crate::qcommon::*;

/// Longest string the reader will assemble before it stops consuming.
pub const MAX_MSG_STRING: usize = 2048;

// ============================================================
// SizeBuf operations
// ============================================================

impl SizeBuf {
    /// Get writable space in the buffer. Returns start offset of the space.
    /// Returns None on overflow.
    pub fn get_space(&mut self, length: usize) -> Option<usize> {
        let cursize = self.cursize as usize;
        let maxsize = self.maxsize as usize;

        if cursize + length > maxsize {
            if !self.allow_overflow || length > maxsize {
                tracing::warn!(length, maxsize, "SZ_GetSpace: overflow");
                self.overflowed = true;
                return None;
            }
            tracing::debug!("SZ_GetSpace: overflow, buffer cleared");
            self.clear();
            self.overflowed = true;
        }

        let start = self.cursize as usize;
        self.cursize += length as i32;
        Some(start)
    }

    /// Write raw bytes into the buffer.
    pub fn write(&mut self, src: &[u8]) {
        if let Some(start) = self.get_space(src.len()) {
            self.data[start..start + src.len()].copy_from_slice(src);
        }
    }

    /// Claim `len` unread bytes and return their offset.
    fn claim(&mut self, len: usize) -> Result<usize> {
        let rc = self.readcount.max(0) as usize;
        let cs = self.cursize.max(0) as usize;
        if rc + len > cs {
            return Err(ProtocolError::EndOfMessage {
                offset: self.readcount,
                needed: len,
                size: self.cursize,
            });
        }
        self.readcount += len as i32;
        Ok(rc)
    }
}

// ============================================================
// MSG write functions
// ============================================================

pub fn msg_write_char(sb: &mut SizeBuf, c: i32) {
    if let Some(start) = sb.get_space(1) {
        sb.data[start] = c as u8;
    }
}

pub fn msg_write_byte(sb: &mut SizeBuf, c: i32) {
    if let Some(start) = sb.get_space(1) {
        sb.data[start] = c as u8;
    }
}

pub fn msg_write_short(sb: &mut SizeBuf, c: i32) {
    if let Some(start) = sb.get_space(2) {
        sb.data[start..start + 2].copy_from_slice(&(c as i16).to_le_bytes());
    }
}

pub fn msg_write_long(sb: &mut SizeBuf, c: i32) {
    if let Some(start) = sb.get_space(4) {
        sb.data[start..start + 4].copy_from_slice(&c.to_le_bytes());
    }
}

pub fn msg_write_string(sb: &mut SizeBuf, s: &str) {
    sb.write(s.as_bytes());
    sb.write(&[0]);
}

pub fn msg_write_coord(sb: &mut SizeBuf, f: f32) {
    msg_write_short(sb, (f * 8.0) as i32);
}

pub fn msg_write_angle(sb: &mut SizeBuf, f: f32) {
    msg_write_byte(sb, ((f * 256.0 / 360.0) as i32) & 255);
}

pub fn msg_write_angle16(sb: &mut SizeBuf, f: f32) {
    msg_write_short(sb, angle2short(f));
}

/// Writes part of a packetentities message.
/// Can delta from either a baseline or a previous packet entity.
pub fn msg_write_delta_entity(
    from: &EntityState,
    to: &EntityState,
    msg: &mut SizeBuf,
    force: bool,
    newentity: bool,
) -> Result<()> {
    if to.number <= 0 || to.number as usize >= MAX_EDICTS {
        return Err(ProtocolError::BadEntityNumber {
            context: "MSG_WriteDeltaEntity",
            number: to.number,
        });
    }

    let mut bits = EntityBits::empty();

    if to.number >= 256 { bits |= U_NUMBER16; }

    if to.origin[0] != from.origin[0] { bits |= U_ORIGIN1; }
    if to.origin[1] != from.origin[1] { bits |= U_ORIGIN2; }
    if to.origin[2] != from.origin[2] { bits |= U_ORIGIN3; }

    if to.angles[0] != from.angles[0] { bits |= U_ANGLE1; }
    if to.angles[1] != from.angles[1] { bits |= U_ANGLE2; }
    if to.angles[2] != from.angles[2] { bits |= U_ANGLE3; }

    if to.skinnum != from.skinnum {
        if (to.skinnum as u32) < 256 { bits |= U_SKIN8; }
        else if (to.skinnum as u32) < 0x8000 { bits |= U_SKIN16; }
        else { bits |= U_SKIN8 | U_SKIN16; }
    }

    if to.frame != from.frame {
        if to.frame < 256 { bits |= U_FRAME8; }
        else { bits |= U_FRAME16; }
    }

    if to.effects != from.effects {
        if to.effects < 256 { bits |= U_EFFECTS8; }
        else if to.effects < 0x8000 { bits |= U_EFFECTS16; }
        else { bits |= U_EFFECTS8 | U_EFFECTS16; }
    }

    if to.renderfx != from.renderfx {
        if (to.renderfx as u32) < 256 { bits |= U_RENDERFX8; }
        else if (to.renderfx as u32) < 0x8000 { bits |= U_RENDERFX16; }
        else { bits |= U_RENDERFX8 | U_RENDERFX16; }
    }

    if to.solid != from.solid { bits |= U_SOLID; }

    // event is not delta compressed, just 0 compressed
    if to.event != 0 { bits |= U_EVENT; }

    if to.modelindex != from.modelindex { bits |= U_MODEL; }
    if to.modelindex2 != from.modelindex2 { bits |= U_MODEL2; }
    if to.modelindex3 != from.modelindex3 { bits |= U_MODEL3; }
    if to.modelindex4 != from.modelindex4 { bits |= U_MODEL4; }
    if to.sound != from.sound { bits |= U_SOUND; }

    if newentity || (to.renderfx & RF_BEAM != 0) {
        bits |= U_OLDORIGIN;
    }

    if bits.is_empty() && !force {
        return Ok(()); // nothing to send
    }

    let raw = bits.bits();
    if raw & 0xff00_0000 != 0 {
        bits |= U_MOREBITS3 | U_MOREBITS2 | U_MOREBITS1;
    } else if raw & 0x00ff_0000 != 0 {
        bits |= U_MOREBITS2 | U_MOREBITS1;
    } else if raw & 0x0000_ff00 != 0 {
        bits |= U_MOREBITS1;
    }

    let raw = bits.bits() as i32;
    msg_write_byte(msg, raw & 255);
    if bits.contains(U_MOREBITS1) { msg_write_byte(msg, (raw >> 8) & 255); }
    if bits.contains(U_MOREBITS2) { msg_write_byte(msg, (raw >> 16) & 255); }
    if bits.contains(U_MOREBITS3) { msg_write_byte(msg, (raw >> 24) & 255); }

    if bits.contains(U_NUMBER16) {
        msg_write_short(msg, to.number);
    } else {
        msg_write_byte(msg, to.number);
    }

    if bits.contains(U_MODEL) { msg_write_byte(msg, to.modelindex); }
    if bits.contains(U_MODEL2) { msg_write_byte(msg, to.modelindex2); }
    if bits.contains(U_MODEL3) { msg_write_byte(msg, to.modelindex3); }
    if bits.contains(U_MODEL4) { msg_write_byte(msg, to.modelindex4); }

    if bits.contains(U_FRAME8) { msg_write_byte(msg, to.frame); }
    if bits.contains(U_FRAME16) { msg_write_short(msg, to.frame); }

    write_sized(msg, bits, U_SKIN8, U_SKIN16, to.skinnum);
    write_sized(msg, bits, U_EFFECTS8, U_EFFECTS16, to.effects as i32);
    write_sized(msg, bits, U_RENDERFX8, U_RENDERFX16, to.renderfx);

    if bits.contains(U_ORIGIN1) { msg_write_coord(msg, to.origin[0]); }
    if bits.contains(U_ORIGIN2) { msg_write_coord(msg, to.origin[1]); }
    if bits.contains(U_ORIGIN3) { msg_write_coord(msg, to.origin[2]); }

    if bits.contains(U_ANGLE1) { msg_write_angle(msg, to.angles[0]); }
    if bits.contains(U_ANGLE2) { msg_write_angle(msg, to.angles[1]); }
    if bits.contains(U_ANGLE3) { msg_write_angle(msg, to.angles[2]); }

    if bits.contains(U_OLDORIGIN) {
        msg_write_coord(msg, to.old_origin[0]);
        msg_write_coord(msg, to.old_origin[1]);
        msg_write_coord(msg, to.old_origin[2]);
    }

    if bits.contains(U_SOUND) { msg_write_byte(msg, to.sound); }
    if bits.contains(U_EVENT) { msg_write_byte(msg, to.event); }
    if bits.contains(U_SOLID) { msg_write_short(msg, to.solid); }

    Ok(())
}

/// Tells the client that `number` is gone from the new frame.
pub fn msg_write_remove_entity(msg: &mut SizeBuf, number: i32) {
    let mut bits = U_REMOVE;
    if number >= 256 {
        bits |= U_NUMBER16 | U_MOREBITS1;
    }
    let raw = bits.bits() as i32;
    msg_write_byte(msg, raw & 255);
    if bits.contains(U_MOREBITS1) {
        msg_write_byte(msg, (raw >> 8) & 255);
    }
    if bits.contains(U_NUMBER16) {
        msg_write_short(msg, number);
    } else {
        msg_write_byte(msg, number);
    }
}

fn write_sized(msg: &mut SizeBuf, bits: EntityBits, narrow: EntityBits, wide: EntityBits, value: i32) {
    match (bits.contains(narrow), bits.contains(wide)) {
        (true, true) => msg_write_long(msg, value),
        (true, false) => msg_write_byte(msg, value),
        (false, true) => msg_write_short(msg, value),
        (false, false) => {}
    }
}

/// Writes an svc_playerinfo block, deltaed against `from` (or the default
/// player state when there is no reference frame).
pub fn msg_write_delta_playerstate(from: Option<&PlayerState>, ps: &PlayerState, msg: &mut SizeBuf) {
    let dummy = PlayerState::default();
    let ops = from.unwrap_or(&dummy);

    //
    // determine what needs to be sent
    //
    let mut pflags = PlayerStateFlags::empty();

    if ps.pmove.pm_type != ops.pmove.pm_type { pflags |= PS_M_TYPE; }
    if ps.pmove.origin != ops.pmove.origin { pflags |= PS_M_ORIGIN; }
    if ps.pmove.velocity != ops.pmove.velocity { pflags |= PS_M_VELOCITY; }
    if ps.pmove.pm_time != ops.pmove.pm_time { pflags |= PS_M_TIME; }
    if ps.pmove.pm_flags != ops.pmove.pm_flags { pflags |= PS_M_FLAGS; }
    if ps.pmove.gravity != ops.pmove.gravity { pflags |= PS_M_GRAVITY; }
    if ps.pmove.delta_angles != ops.pmove.delta_angles { pflags |= PS_M_DELTA_ANGLES; }
    if ps.viewoffset != ops.viewoffset { pflags |= PS_VIEWOFFSET; }
    if ps.viewangles != ops.viewangles { pflags |= PS_VIEWANGLES; }
    if ps.kick_angles != ops.kick_angles { pflags |= PS_KICKANGLES; }
    if ps.blend != ops.blend { pflags |= PS_BLEND; }
    if ps.fov != ops.fov { pflags |= PS_FOV; }
    if ps.rdflags != ops.rdflags { pflags |= PS_RDFLAGS; }
    if ps.gunframe != ops.gunframe
        || ps.gunoffset != ops.gunoffset
        || ps.gunangles != ops.gunangles
    {
        pflags |= PS_WEAPONFRAME;
    }
    if ps.gunindex != ops.gunindex { pflags |= PS_WEAPONINDEX; }

    //
    // write it
    //
    msg_write_byte(msg, SVC_PLAYERINFO);
    msg_write_short(msg, pflags.bits() as i32);

    if pflags.contains(PS_M_TYPE) {
        msg_write_byte(msg, ps.pmove.pm_type as i32);
    }
    if pflags.contains(PS_M_ORIGIN) {
        for v in ps.pmove.origin {
            msg_write_short(msg, v as i32);
        }
    }
    if pflags.contains(PS_M_VELOCITY) {
        for v in ps.pmove.velocity {
            msg_write_short(msg, v as i32);
        }
    }
    if pflags.contains(PS_M_TIME) {
        msg_write_byte(msg, ps.pmove.pm_time as i32);
    }
    if pflags.contains(PS_M_FLAGS) {
        msg_write_byte(msg, ps.pmove.pm_flags as i32);
    }
    if pflags.contains(PS_M_GRAVITY) {
        msg_write_short(msg, ps.pmove.gravity as i32);
    }
    if pflags.contains(PS_M_DELTA_ANGLES) {
        for v in ps.pmove.delta_angles {
            msg_write_short(msg, v as i32);
        }
    }

    if pflags.contains(PS_VIEWOFFSET) {
        for v in ps.viewoffset {
            msg_write_char(msg, (v * 4.0) as i32);
        }
    }
    if pflags.contains(PS_VIEWANGLES) {
        for v in ps.viewangles {
            msg_write_angle16(msg, v);
        }
    }
    if pflags.contains(PS_KICKANGLES) {
        for v in ps.kick_angles {
            msg_write_char(msg, (v * 4.0) as i32);
        }
    }
    if pflags.contains(PS_WEAPONINDEX) {
        msg_write_byte(msg, ps.gunindex);
    }
    if pflags.contains(PS_WEAPONFRAME) {
        msg_write_byte(msg, ps.gunframe);
        for v in ps.gunoffset {
            msg_write_char(msg, (v * 4.0) as i32);
        }
        for v in ps.gunangles {
            msg_write_char(msg, (v * 4.0) as i32);
        }
    }
    if pflags.contains(PS_BLEND) {
        for v in ps.blend {
            msg_write_byte(msg, (v * 255.0) as i32);
        }
    }
    if pflags.contains(PS_FOV) {
        msg_write_byte(msg, ps.fov as i32);
    }
    if pflags.contains(PS_RDFLAGS) {
        msg_write_byte(msg, ps.rdflags);
    }

    // send stats
    let mut statbits: u32 = 0;
    for i in 0..MAX_STATS {
        if ps.stats[i] != ops.stats[i] {
            statbits |= 1 << i;
        }
    }
    msg_write_long(msg, statbits as i32);
    for i in 0..MAX_STATS {
        if statbits & (1 << i) != 0 {
            msg_write_short(msg, ps.stats[i] as i32);
        }
    }
}

// ============================================================
// MSG read functions
// ============================================================

pub fn msg_begin_reading(msg: &mut SizeBuf) {
    msg.readcount = 0;
}

pub fn msg_read_char(msg: &mut SizeBuf) -> Result<i32> {
    let rc = msg.claim(1)?;
    Ok(msg.data[rc] as i8 as i32)
}

pub fn msg_read_byte(msg: &mut SizeBuf) -> Result<i32> {
    let rc = msg.claim(1)?;
    Ok(msg.data[rc] as i32)
}

pub fn msg_read_short(msg: &mut SizeBuf) -> Result<i32> {
    let rc = msg.claim(2)?;
    Ok(i16::from_le_bytes([msg.data[rc], msg.data[rc + 1]]) as i32)
}

pub fn msg_read_long(msg: &mut SizeBuf) -> Result<i32> {
    let rc = msg.claim(4)?;
    Ok(i32::from_le_bytes([
        msg.data[rc],
        msg.data[rc + 1],
        msg.data[rc + 2],
        msg.data[rc + 3],
    ]))
}

/// Reads a NUL-terminated string. Bytes map one-to-one onto chars.
pub fn msg_read_string(msg: &mut SizeBuf) -> Result<String> {
    let start = msg.readcount;
    let mut result = String::new();
    let mut count = 0;
    loop {
        let c = match msg_read_byte(msg) {
            Ok(c) => c,
            Err(err) => {
                // unterminated: leave the cursor where the string began
                msg.readcount = start;
                return Err(err);
            }
        };
        if c == 0 {
            break;
        }
        result.push(c as u8 as char);
        count += 1;
        if count >= MAX_MSG_STRING - 1 {
            break;
        }
    }
    Ok(result)
}

pub fn msg_read_coord(msg: &mut SizeBuf) -> Result<f32> {
    Ok(msg_read_short(msg)? as f32 * (1.0 / 8.0))
}

pub fn msg_read_pos(msg: &mut SizeBuf) -> Result<Vec3> {
    Ok([
        msg_read_coord(msg)?,
        msg_read_coord(msg)?,
        msg_read_coord(msg)?,
    ])
}

pub fn msg_read_angle(msg: &mut SizeBuf) -> Result<f32> {
    Ok(msg_read_char(msg)? as f32 * (360.0 / 256.0))
}

pub fn msg_read_angle16(msg: &mut SizeBuf) -> Result<f32> {
    Ok(short2angle(msg_read_short(msg)? as i16))
}

pub fn msg_read_data(msg: &mut SizeBuf, len: usize) -> Result<Vec<u8>> {
    let rc = msg.claim(len)?;
    Ok(msg.data[rc..rc + len].to_vec())
}
