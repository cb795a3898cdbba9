// cl_pred.rs -- client-side movement prediction
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2 or later.

use q2sync_common::q_shared::*;

use crate::client::*;

/// Manhattan distance, in 1/8 units, beyond which a miss is treated as a teleport.
pub const PREDICTION_TELEPORT_THRESHOLD: i32 = 640; // 80 world units

// ============================================================
// CL_CheckPredictionError
// ============================================================

/// Compare the server's reported player origin with the origin predicted for
/// the command it acknowledges.
/// If the error is small, save it for interpolation.
/// If it's large (teleport), clear the prediction error.
pub fn cl_check_prediction_error(cl: &mut ClientState, incoming_acknowledged: i32, cvars: &ClientCvars) {
    if !cvars.cl_predict || (cl.frame.playerstate.pmove.pm_flags & PMF_NO_PREDICTION) != 0 {
        return;
    }

    // calculate the last usercmd_t we sent that the server has processed
    let frame = (incoming_acknowledged as usize) & CMD_MASK;

    // compare what the server returned with what we had predicted it to be
    let mut delta = [0i32; 3];
    for i in 0..3 {
        delta[i] = cl.frame.playerstate.pmove.origin[i] as i32 - cl.predicted_origins[frame][i] as i32;
    }

    // save the prediction error for interpolation
    let len = delta[0].abs() + delta[1].abs() + delta[2].abs();
    if len > PREDICTION_TELEPORT_THRESHOLD {
        // a teleport or something
        vector_clear(&mut cl.prediction_error);
        return;
    }

    if cvars.cl_showmiss && (delta[0] != 0 || delta[1] != 0 || delta[2] != 0) {
        tracing::debug!(
            "prediction miss on {}: {}",
            cl.frame.serverframe,
            delta[0] + delta[1] + delta[2]
        );
    }

    // copy corrected origin back
    cl.predicted_origins[frame] = cl.frame.playerstate.pmove.origin;

    for i in 0..3 {
        cl.prediction_error[i] = delta[i] as f32 * 0.125;
    }
}

// ============================================================
// CL_PredictMovement
// ============================================================

/// Run client-side movement prediction.
///
/// Sets cl.predicted_origin and cl.predicted_angles by replaying
/// unacknowledged user commands through the player movement code.
pub fn cl_predict_movement(
    cl: &mut ClientState,
    cls: &ClientStatic,
    cvars: &ClientCvars,
    pmove_fn: &dyn Fn(&mut PmoveData),
) {
    if cls.state != ConnState::Active {
        return;
    }

    if cvars.paused {
        return;
    }

    if !cvars.cl_predict || (cl.frame.playerstate.pmove.pm_flags & PMF_NO_PREDICTION) != 0 {
        // just set angles
        for i in 0..3 {
            cl.predicted_angles[i] =
                cl.viewangles[i] + short2angle(cl.frame.playerstate.pmove.delta_angles[i]);
        }
        return;
    }

    let mut ack = cls.netchan.incoming_acknowledged;
    let current = cls.netchan.outgoing_sequence;

    // if we are too far out of date, just freeze
    if current.wrapping_sub(ack) >= CMD_BACKUP as i32 {
        if cvars.cl_showmiss {
            tracing::debug!("exceeded CMD_BACKUP");
        }
        return;
    }

    // copy current state to pmove; angles carry over until a command moves them
    let mut pm = PmoveData {
        s: cl.frame.playerstate.pmove,
        viewangles: cl.predicted_angles,
        ..Default::default()
    };

    // run frames
    while ack.wrapping_add(1) < current {
        ack = ack.wrapping_add(1);
        let frame = (ack as usize) & CMD_MASK;
        pm.cmd = cl.cmds[frame];

        if pm.cmd.msec != 0 {
            pmove_fn(&mut pm);
        }

        // save for debug checking
        cl.predicted_origins[frame] = pm.s.origin;
    }

    let oldz = cl.predicted_origin[2];
    let newz = pm.s.origin[2] as f32 * 0.125;
    let step = newz - oldz;

    // stairs: on ground, moving horizontally, and climbing 8 to 16 units
    let has_velocity = pm.s.velocity[0] != 0 || pm.s.velocity[1] != 0;
    if (pm.s.pm_flags & PMF_ON_GROUND) != 0 && has_velocity && step > 7.0 && step < 17.0 {
        cl.predicted_step = step;
        cl.predicted_step_time = (cls.realtime as f32 - cls.frametime * 500.0) as u32;
    }

    // copy results out for rendering
    for i in 0..3 {
        cl.predicted_origin[i] = pm.s.origin[i] as f32 * 0.125;
    }

    cl.predicted_angles = pm.viewangles;
}
