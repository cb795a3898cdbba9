// test_support.rs -- message builders and a recording callback sink for tests

use q2sync_common::common::*;
use q2sync_common::q_shared::*;
use q2sync_common::qcommon::*;

use crate::cl_ents::ClientCallbacks;

pub fn test_entity(number: i32, modelindex: i32, origin: Vec3) -> EntityState {
    EntityState {
        number,
        modelindex,
        origin,
        old_origin: origin,
        ..Default::default()
    }
}

/// svc_frame body up to and including the area bits.
pub fn write_frame_header(msg: &mut SizeBuf, serverframe: i32, deltaframe: i32, areabits: &[u8]) {
    msg_write_long(msg, serverframe);
    msg_write_long(msg, deltaframe);
    msg_write_byte(msg, 0); // surpresscount
    msg_write_byte(msg, areabits.len() as i32);
    msg.write(areabits);
}

/// An uncompressed frame carrying `entities`, which must be sorted.
pub fn write_keyframe(msg: &mut SizeBuf, serverframe: i32, ps: &PlayerState, entities: &[EntityState]) {
    write_frame_header(msg, serverframe, -1, &[]);
    msg_write_delta_playerstate(None, ps, msg);
    msg_write_byte(msg, SVC_PACKETENTITIES);
    let null_state = EntityState::default();
    for ent in entities {
        msg_write_delta_entity(&null_state, ent, msg, true, true).unwrap();
    }
    msg_write_short(msg, 0);
}

/// A frame deltaed from `deltaframe`. `body` writes the entity updates.
pub fn write_delta_frame(
    msg: &mut SizeBuf,
    serverframe: i32,
    deltaframe: i32,
    from: Option<&PlayerState>,
    ps: &PlayerState,
    body: impl FnOnce(&mut SizeBuf),
) {
    write_frame_header(msg, serverframe, deltaframe, &[]);
    msg_write_delta_playerstate(from, ps, msg);
    msg_write_byte(msg, SVC_PACKETENTITIES);
    body(msg);
    msg_write_short(msg, 0);
}

#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    /// (entity number, event)
    pub events: Vec<(i32, i32)>,
    pub teleporters: Vec<i32>,
    pub became_active: u32,
    pub prints: Vec<(i32, String)>,
    pub stufftext: Vec<String>,
    pub centerprints: Vec<String>,
    pub configstrings: Vec<(usize, String)>,
}

impl ClientCallbacks for RecordingCallbacks {
    fn cl_entity_event(&mut self, ent: &EntityState) {
        self.events.push((ent.number, ent.event));
    }

    fn cl_teleporter_particles(&mut self, ent: &EntityState) {
        self.teleporters.push(ent.number);
    }

    fn cl_became_active(&mut self) {
        self.became_active += 1;
    }

    fn print(&mut self, level: i32, text: &str) {
        self.prints.push((level, text.to_string()));
    }

    fn stufftext(&mut self, text: &str) {
        self.stufftext.push(text.to_string());
    }

    fn centerprint(&mut self, text: &str) {
        self.centerprints.push(text.to_string());
    }

    fn configstring_changed(&mut self, index: usize, value: &str) {
        self.configstrings.push((index, value.to_string()));
    }
}
