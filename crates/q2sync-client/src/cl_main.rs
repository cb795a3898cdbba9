// cl_main.rs -- client connection lifecycle and per-frame tick
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2 or later.

use q2sync_common::cvar::CvarContext;
use q2sync_common::error::Result;
use q2sync_common::net_queue::PacketQueue;
use q2sync_common::q_shared::*;
use q2sync_common::qcommon::{NetChan, SizeBuf};

use crate::cl_ents::{ClientCallbacks, ClientEntState};
use crate::cl_input::cl_queue_cmd;
use crate::cl_parse::cl_parse_server_message;
use crate::cl_pred::cl_predict_movement;
use crate::client::*;

// ============================================================
// Cvars
// ============================================================

pub fn cl_register_cvars(cvars: &mut CvarContext) {
    cvars.get("cl_predict", Some("1"), CVAR_ARCHIVE);
    cvars.get("cl_showmiss", Some("0"), CVAR_ZERO);
    cvars.get("cl_shownet", Some("0"), CVAR_ZERO);
    cvars.get("paused", Some("0"), CVAR_ZERO);

    // clear this so we know when the user toggles it
    cvars.take_modified("cl_predict");
}

impl ClientCvars {
    /// Snapshot of the client cvars for one tick.
    pub fn from_cvars(cvars: &CvarContext) -> Self {
        Self {
            cl_predict: cvars.variable_value("cl_predict") != 0.0,
            cl_showmiss: cvars.variable_value("cl_showmiss") != 0.0,
            cl_shownet: cvars.variable_value("cl_shownet") as i32,
            paused: cvars.variable_value("paused") != 0.0,
        }
    }
}

// ============================================================
// ClientConnection
// ============================================================

/// Everything the client knows about one server connection.
pub struct ClientConnection {
    pub cl: ClientState,
    pub cls: ClientStatic,
    pub ent_state: ClientEntState,
    pub cvars: CvarContext,
}

impl Default for ClientConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConnection {
    pub fn new() -> Self {
        let mut cvars = CvarContext::new();
        cl_register_cvars(&mut cvars);
        Self {
            cl: ClientState::default(),
            cls: ClientStatic::default(),
            ent_state: ClientEntState::new(),
            cvars,
        }
    }

    pub fn client_cvars(&self) -> ClientCvars {
        ClientCvars::from_cvars(&self.cvars)
    }

    /// CL_Disconnect -- drop all level and connection state. Cvars survive.
    pub fn reset(&mut self) {
        if self.cls.state != ConnState::Disconnected {
            tracing::info!("disconnected from server");
        }
        self.cl = ClientState::default();
        self.ent_state.clear();
        self.cls.state = ConnState::Disconnected;
        self.cls.netchan = NetChan::default();
        self.cls.server_protocol = 0;
        self.cvars.set_value("paused", 0.0);
    }

    /// Parse one datagram to completion. A protocol error drops the
    /// connection before it is returned.
    pub fn parse_message(&mut self, data: &[u8], callbacks: &mut dyn ClientCallbacks) -> Result<()> {
        let mut net_message = SizeBuf::from_bytes(data);
        let cvars = self.client_cvars();
        let result = cl_parse_server_message(
            &mut self.cl,
            &mut self.cls,
            &mut self.ent_state,
            &mut net_message,
            &cvars,
            callbacks,
        );
        if let Err(err) = &result {
            tracing::error!(%err, readcount = net_message.readcount, "dropping connection");
            self.reset();
        }
        result
    }

    /// CL_Frame -- advance the clock, parse everything that arrived, then
    /// predict the local player.
    pub fn run_frame(
        &mut self,
        queue: &PacketQueue,
        realtime: i32,
        pmove_fn: &dyn Fn(&mut PmoveData),
        callbacks: &mut dyn ClientCallbacks,
    ) -> Result<()> {
        let msec = realtime.wrapping_sub(self.cls.realtime).max(0);
        self.cls.frametime = msec as f32 / 1000.0;
        self.cls.realtime = realtime;
        self.cl.time = self.cl.time.wrapping_add(msec);

        // fetch results from server
        while let Some(packet) = queue.try_recv() {
            if !self.cls.netchan.process_header(packet.sequence, packet.acknowledged) {
                tracing::debug!(
                    sequence = packet.sequence,
                    incoming = self.cls.netchan.incoming_sequence,
                    "out of order packet"
                );
                continue;
            }
            if let Err(err) = self.parse_message(&packet.data, callbacks) {
                let dropped = queue.clear();
                if dropped > 0 {
                    tracing::debug!(dropped, "discarding queued datagrams");
                }
                return Err(err);
            }
        }

        // predict all unacknowledged movements
        if self.cvars.take_modified("cl_predict") {
            tracing::info!(enabled = self.cvars.variable_value("cl_predict") != 0.0, "cl_predict changed");
        }
        let cvars = self.client_cvars();
        cl_predict_movement(&mut self.cl, &self.cls, &cvars, pmove_fn);
        Ok(())
    }

    /// Save a freshly built command for sending and prediction.
    pub fn queue_cmd(&mut self, cmd: UserCmd) -> i32 {
        cl_queue_cmd(&mut self.cl, &mut self.cls, cmd)
    }

    pub fn state(&self) -> ConnState {
        self.cls.state
    }

    /// The latest frame received from the server.
    pub fn frame(&self) -> &Frame {
        &self.cl.frame
    }

    /// Entities of the latest frame, ascending by number.
    pub fn frame_entities(&self) -> impl Iterator<Item = &EntityState> + '_ {
        self.ent_state.frame_entities(&self.cl.frame)
    }

    pub fn entity(&self, number: usize) -> Option<&CEntity> {
        self.ent_state.cl_entities.get(number)
    }

    pub fn predicted_origin(&self) -> Vec3 {
        self.cl.predicted_origin
    }

    pub fn predicted_angles(&self) -> Vec3 {
        self.cl.predicted_angles
    }

    pub fn prediction_error(&self) -> Vec3 {
        self.cl.prediction_error
    }
}
