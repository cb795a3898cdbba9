// cl_ents.rs -- entity parsing and frame assembly
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2 or later.

use rayon::prelude::*;

use q2sync_common::common::*;
use q2sync_common::error::{ProtocolError, Result};
use q2sync_common::q_shared::*;
use q2sync_common::qcommon::*;

use crate::cl_parse::cl_shownet;
use crate::cl_pred::cl_check_prediction_error;
use crate::client::*;

// The entity arrays are large and live outside ClientState so that frame
// assembly can borrow them next to it.

/// Per-slot entity bookkeeping and the parsed entities ring.
pub struct ClientEntState {
    pub cl_entities: Vec<CEntity>,
    pub cl_parse_entities: Vec<EntityState>,
}

impl Default for ClientEntState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientEntState {
    pub fn new() -> Self {
        let cl_entities: Vec<CEntity> = (0..MAX_EDICTS)
            .into_par_iter()
            .map(|_| CEntity::default())
            .collect();
        let cl_parse_entities: Vec<EntityState> = (0..MAX_PARSE_ENTITIES)
            .into_par_iter()
            .map(|_| EntityState::default())
            .collect();
        Self {
            cl_entities,
            cl_parse_entities,
        }
    }

    /// Forget baselines, entity history and every parsed state.
    pub fn clear(&mut self) {
        self.cl_entities
            .par_iter_mut()
            .for_each(|ent| *ent = CEntity::default());
        self.cl_parse_entities
            .par_iter_mut()
            .for_each(|s| *s = EntityState::default());
    }

    /// Entity states of `frame`, in ascending entity number.
    pub fn frame_entities<'a>(&'a self, frame: &Frame) -> impl Iterator<Item = &'a EntityState> + 'a {
        let start = frame.parse_entities;
        (0..frame.num_entities.max(0) as u32)
            .map(move |i| &self.cl_parse_entities[parse_entity_index(start.wrapping_add(i))])
    }
}

// =========================================================================
// Callback trait -- what the rest of the client hears from the parser
// =========================================================================

/// Hooks into the effects, console and sound layers. All methods default to
/// doing nothing so hosts only implement what they use.
pub trait ClientCallbacks {
    fn cl_entity_event(&mut self, _ent: &EntityState) {}
    /// EF_TELEPORTER acts like an event, but is not cleared each frame.
    fn cl_teleporter_particles(&mut self, _ent: &EntityState) {}
    /// The first valid frame arrived; the level can be shown.
    fn cl_became_active(&mut self) {}
    fn print(&mut self, _level: i32, _text: &str) {}
    fn stufftext(&mut self, _text: &str) {}
    fn centerprint(&mut self, _text: &str) {}
    fn configstring_changed(&mut self, _index: usize, _value: &str) {}
}

/// Callbacks for hosts that do not listen.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCallbacks;

impl ClientCallbacks for NullCallbacks {}

// =========================================================================
// FRAME PARSING
// =========================================================================

/// CL_ParseEntityBits -- Returns the entity number and the header bits.
pub fn cl_parse_entity_bits(
    net_message: &mut SizeBuf,
    bitcounts: &mut [u32; 32],
) -> Result<(i32, EntityBits)> {
    let mut total = msg_read_byte(net_message)? as u32;
    if total & U_MOREBITS1.bits() != 0 {
        total |= (msg_read_byte(net_message)? as u32) << 8;
    }
    if total & U_MOREBITS2.bits() != 0 {
        total |= (msg_read_byte(net_message)? as u32) << 16;
    }
    if total & U_MOREBITS3.bits() != 0 {
        total |= (msg_read_byte(net_message)? as u32) << 24;
    }

    // count the bits for net profiling
    for (i, count) in bitcounts.iter_mut().enumerate() {
        if total & (1 << i) != 0 {
            *count = count.wrapping_add(1);
        }
    }

    let bits = EntityBits::from_bits_retain(total);
    let number = if bits.contains(U_NUMBER16) {
        msg_read_short(net_message)?
    } else {
        msg_read_byte(net_message)?
    };

    if number < 0 || number as usize >= MAX_EDICTS {
        return Err(ProtocolError::BadEntityNumber {
            context: "CL_ParseEntityBits",
            number,
        });
    }

    Ok((number, bits))
}

/// Width of a field announced by a pair of change bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    /// Neither bit: the field keeps the reference value.
    Absent,
    /// Narrow bit only: one byte.
    Narrow,
    /// Wide bit only: a signed short.
    Wide,
    /// Both bits: a long.
    Widest,
}

impl FieldWidth {
    pub fn select(bits: EntityBits, narrow: EntityBits, wide: EntityBits) -> Self {
        match (bits.contains(narrow), bits.contains(wide)) {
            (false, false) => FieldWidth::Absent,
            (true, false) => FieldWidth::Narrow,
            (false, true) => FieldWidth::Wide,
            (true, true) => FieldWidth::Widest,
        }
    }

    pub fn wire_size(self) -> usize {
        match self {
            FieldWidth::Absent => 0,
            FieldWidth::Narrow => 1,
            FieldWidth::Wide => 2,
            FieldWidth::Widest => 4,
        }
    }

    pub fn read(self, net_message: &mut SizeBuf) -> Result<Option<i32>> {
        Ok(match self {
            FieldWidth::Absent => None,
            FieldWidth::Narrow => Some(msg_read_byte(net_message)?),
            FieldWidth::Wide => Some(msg_read_short(net_message)?),
            FieldWidth::Widest => Some(msg_read_long(net_message)?),
        })
    }
}

/// CL_ParseDelta -- Can go from either a baseline or a previous packet_entity.
pub fn cl_parse_delta(
    from: &EntityState,
    number: i32,
    bits: EntityBits,
    net_message: &mut SizeBuf,
) -> Result<EntityState> {
    // set everything to the state we are delta'ing from
    let mut to = *from;

    to.old_origin = from.origin;
    to.number = number;

    if bits.contains(U_MODEL) {
        to.modelindex = msg_read_byte(net_message)?;
    }
    if bits.contains(U_MODEL2) {
        to.modelindex2 = msg_read_byte(net_message)?;
    }
    if bits.contains(U_MODEL3) {
        to.modelindex3 = msg_read_byte(net_message)?;
    }
    if bits.contains(U_MODEL4) {
        to.modelindex4 = msg_read_byte(net_message)?;
    }

    if bits.contains(U_FRAME8) {
        to.frame = msg_read_byte(net_message)?;
    }
    if bits.contains(U_FRAME16) {
        to.frame = msg_read_short(net_message)?;
    }

    // used for laser colors when both bits are set
    if let Some(skin) = FieldWidth::select(bits, U_SKIN8, U_SKIN16).read(net_message)? {
        to.skinnum = skin;
    }
    if let Some(effects) = FieldWidth::select(bits, U_EFFECTS8, U_EFFECTS16).read(net_message)? {
        to.effects = effects as u32;
    }
    if let Some(renderfx) = FieldWidth::select(bits, U_RENDERFX8, U_RENDERFX16).read(net_message)? {
        to.renderfx = renderfx;
    }

    if bits.contains(U_ORIGIN1) {
        to.origin[0] = msg_read_coord(net_message)?;
    }
    if bits.contains(U_ORIGIN2) {
        to.origin[1] = msg_read_coord(net_message)?;
    }
    if bits.contains(U_ORIGIN3) {
        to.origin[2] = msg_read_coord(net_message)?;
    }

    if bits.contains(U_ANGLE1) {
        to.angles[0] = msg_read_angle(net_message)?;
    }
    if bits.contains(U_ANGLE2) {
        to.angles[1] = msg_read_angle(net_message)?;
    }
    if bits.contains(U_ANGLE3) {
        to.angles[2] = msg_read_angle(net_message)?;
    }

    if bits.contains(U_OLDORIGIN) {
        to.old_origin = msg_read_pos(net_message)?;
    }

    if bits.contains(U_SOUND) {
        to.sound = msg_read_byte(net_message)?;
    }

    if bits.contains(U_EVENT) {
        to.event = msg_read_byte(net_message)?;
    } else {
        to.event = 0;
    }

    if bits.contains(U_SOLID) {
        to.solid = msg_read_short(net_message)?;
    }

    Ok(to)
}

/// Apply a freshly decoded state to an entity's interpolation bookkeeping.
pub fn cl_update_entity(ent: &mut CEntity, state: &EntityState, serverframe: i32) {
    // some data changes will force no lerping
    if state.modelindex != ent.current.modelindex
        || state.modelindex2 != ent.current.modelindex2
        || state.modelindex3 != ent.current.modelindex3
        || state.modelindex4 != ent.current.modelindex4
        || (state.origin[0] - ent.current.origin[0]).abs() > 512.0
        || (state.origin[1] - ent.current.origin[1]).abs() > 512.0
        || (state.origin[2] - ent.current.origin[2]).abs() > 512.0
        || is_teleport_event(state.event)
    {
        ent.serverframe = NO_LERP_SERVERFRAME;
    }

    if ent.serverframe != serverframe.wrapping_sub(1) {
        // wasn't in last update, so initialize some things
        ent.trailcount = 1024; // for diminishing rocket / grenade trails
        // duplicate the current state so lerping doesn't hurt anything
        ent.prev = *state;
        if is_teleport_event(state.event) {
            ent.prev.origin = state.origin;
            ent.lerp_origin = state.origin;
        } else {
            ent.prev.origin = state.old_origin;
            ent.lerp_origin = state.old_origin;
        }
    } else {
        // shuffle the last state to previous
        ent.prev = ent.current;
    }

    ent.serverframe = serverframe;
    ent.current = *state;
}

/// CL_DeltaEntity -- Parses deltas from the given base and adds the resulting
/// entity to the current frame.
pub fn cl_delta_entity(
    frame: &mut Frame,
    newnum: i32,
    old: &EntityState,
    bits: EntityBits,
    cl: &mut ClientState,
    ent_state: &mut ClientEntState,
    net_message: &mut SizeBuf,
) -> Result<()> {
    let state = cl_parse_delta(old, newnum, bits, net_message)?;
    cl_add_entity(frame, &state, cl, ent_state)
}

/// Records an already decoded state as the next entity of `frame`.
pub fn cl_add_entity(
    frame: &mut Frame,
    state: &EntityState,
    cl: &mut ClientState,
    ent_state: &mut ClientEntState,
) -> Result<()> {
    let ent = ent_state
        .cl_entities
        .get_mut(state.number as usize)
        .ok_or(ProtocolError::BadEntityNumber {
            context: "CL_AddEntity",
            number: state.number,
        })?;
    cl_update_entity(ent, state, frame.serverframe);

    let state_idx = parse_entity_index(cl.parse_entities);
    ent_state.cl_parse_entities[state_idx] = *state;
    cl.parse_entities = cl.parse_entities.wrapping_add(1);
    frame.num_entities += 1;

    Ok(())
}

// =========================================================================
// Packet entity merge
// =========================================================================

/// Stands in for "no more entities in the reference frame".
pub const ENTITY_SENTINEL: i32 = 99999;

/// One decision of the merge between the reference frame's entities and
/// the update stream.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeStep {
    /// Carried over from the reference frame with no update.
    Unchanged(EntityState),
    /// `number` left the frame. `oldnum` is the reference entity the cursor
    /// skipped; the two differ only when the server misbehaves.
    Removed { number: i32, oldnum: i32 },
    /// Update against the reference frame's copy of the same entity.
    DeltaFromPrevious {
        number: i32,
        bits: EntityBits,
        from: EntityState,
    },
    /// Update for an entity the reference frame lacks; decode it against the
    /// slot's baseline.
    DeltaFromBaseline { number: i32, bits: EntityBits },
}

/// Sorted merge-join of a reference frame's entity range against the entity
/// headers of an svc_packetentities block.
///
/// The merge reads headers off the message but never field data; the caller
/// decodes fields for each delta step before asking for the next one.
#[derive(Debug, Clone)]
pub struct PacketEntityMerge {
    old_start: u32,
    old_count: i32,
    oldindex: i32,
    oldstate: EntityState,
    oldnum: i32,
    needs_load: bool,
    pending: Option<(i32, EntityBits)>,
    terminated: bool,
}

impl PacketEntityMerge {
    pub fn new(oldframe: Option<&Frame>) -> Self {
        let (old_start, old_count) = oldframe.map_or((0, 0), |f| (f.parse_entities, f.num_entities));
        Self {
            old_start,
            old_count,
            oldindex: 0,
            oldstate: EntityState::default(),
            oldnum: ENTITY_SENTINEL,
            needs_load: true,
            pending: None,
            terminated: false,
        }
    }

    /// Entity number under the reference cursor, `ENTITY_SENTINEL` once exhausted.
    pub fn oldnum(&self) -> i32 {
        self.oldnum
    }

    // Old entities are fetched lazily so that a step's output lands in the
    // ring before the next reference slot is read.
    fn load_old(&mut self, ring: &[EntityState]) {
        if !self.needs_load {
            return;
        }
        self.needs_load = false;
        if self.oldindex >= self.old_count {
            self.oldnum = ENTITY_SENTINEL;
            self.oldstate = EntityState::default();
        } else {
            let idx = parse_entity_index(self.old_start.wrapping_add(self.oldindex as u32));
            self.oldstate = ring[idx];
            self.oldnum = self.oldstate.number;
        }
    }

    fn advance_old(&mut self) {
        self.oldindex += 1;
        self.needs_load = true;
    }

    /// Next merge decision, or `None` once the terminator was read and the
    /// reference frame is exhausted.
    pub fn next_step(
        &mut self,
        ring: &[EntityState],
        net_message: &mut SizeBuf,
        bitcounts: &mut [u32; 32],
    ) -> Result<Option<MergeStep>> {
        loop {
            self.load_old(ring);

            if self.terminated {
                // any remaining entities in the old frame are copied over
                if self.oldnum == ENTITY_SENTINEL {
                    return Ok(None);
                }
                let step = MergeStep::Unchanged(self.oldstate);
                self.advance_old();
                return Ok(Some(step));
            }

            let (newnum, bits) = match self.pending {
                Some(header) => header,
                None => {
                    let header = cl_parse_entity_bits(net_message, bitcounts)?;
                    if header.0 == 0 {
                        self.terminated = true;
                        continue;
                    }
                    self.pending = Some(header);
                    header
                }
            };

            if self.oldnum < newnum {
                // one or more entities from the old packet are unchanged
                let step = MergeStep::Unchanged(self.oldstate);
                self.advance_old();
                return Ok(Some(step));
            }

            self.pending = None;

            if bits.contains(U_REMOVE) {
                // the entity present in oldframe is not in the current frame
                let step = MergeStep::Removed {
                    number: newnum,
                    oldnum: self.oldnum,
                };
                self.advance_old();
                return Ok(Some(step));
            }

            if self.oldnum == newnum {
                let step = MergeStep::DeltaFromPrevious {
                    number: newnum,
                    bits,
                    from: self.oldstate,
                };
                self.advance_old();
                return Ok(Some(step));
            }

            // oldnum > newnum: not in the old frame, the cursor stays put
            return Ok(Some(MergeStep::DeltaFromBaseline { number: newnum, bits }));
        }
    }
}

/// CL_ParsePacketEntities -- An svc_packetentities has just been parsed,
/// deal with the rest of the data stream.
pub fn cl_parse_packet_entities(
    oldframe: Option<&Frame>,
    newframe: &mut Frame,
    cl: &mut ClientState,
    ent_state: &mut ClientEntState,
    net_message: &mut SizeBuf,
    cl_shownet_value: i32,
) -> Result<()> {
    newframe.parse_entities = cl.parse_entities;
    newframe.num_entities = 0;

    let mut merge = PacketEntityMerge::new(oldframe);
    while let Some(step) = merge.next_step(&ent_state.cl_parse_entities, net_message, &mut cl.bitcounts)? {
        match step {
            MergeStep::Unchanged(old) => {
                if cl_shownet_value == 3 {
                    tracing::debug!("   unchanged: {}", old.number);
                }
                cl_add_entity(newframe, &old, cl, ent_state)?;
            }
            MergeStep::Removed { number, oldnum } => {
                if cl_shownet_value == 3 {
                    tracing::debug!("   remove: {}", number);
                }
                if oldnum != number {
                    tracing::debug!(oldnum, newnum = number, "U_REMOVE: oldnum != newnum");
                }
            }
            MergeStep::DeltaFromPrevious { number, bits, from } => {
                if cl_shownet_value == 3 {
                    tracing::debug!("   delta: {}", number);
                }
                cl_delta_entity(newframe, number, &from, bits, cl, ent_state, net_message)?;
            }
            MergeStep::DeltaFromBaseline { number, bits } => {
                if cl_shownet_value == 3 {
                    tracing::debug!("   baseline: {}", number);
                }
                let baseline = ent_state.cl_entities[number as usize].baseline;
                cl_delta_entity(newframe, number, &baseline, bits, cl, ent_state, net_message)?;
            }
        }
    }

    Ok(())
}

/// CL_ParsePlayerstate
pub fn cl_parse_playerstate(
    oldframe: Option<&Frame>,
    newframe: &mut Frame,
    net_message: &mut SizeBuf,
    attractloop: bool,
) -> Result<()> {
    let state = &mut newframe.playerstate;

    // clear to old value before delta parsing
    *state = oldframe.map(|old| old.playerstate.clone()).unwrap_or_default();

    let flags = PlayerStateFlags::from_bits_retain(msg_read_short(net_message)? as u16);

    // parse the pmove_state_t
    if flags.contains(PS_M_TYPE) {
        state.pmove.pm_type = PmType::from_wire(msg_read_byte(net_message)?);
    }

    if flags.contains(PS_M_ORIGIN) {
        for v in state.pmove.origin.iter_mut() {
            *v = msg_read_short(net_message)? as i16;
        }
    }

    if flags.contains(PS_M_VELOCITY) {
        for v in state.pmove.velocity.iter_mut() {
            *v = msg_read_short(net_message)? as i16;
        }
    }

    if flags.contains(PS_M_TIME) {
        state.pmove.pm_time = msg_read_byte(net_message)? as u8;
    }

    if flags.contains(PS_M_FLAGS) {
        state.pmove.pm_flags = msg_read_byte(net_message)? as u8;
    }

    if flags.contains(PS_M_GRAVITY) {
        state.pmove.gravity = msg_read_short(net_message)? as i16;
    }

    if flags.contains(PS_M_DELTA_ANGLES) {
        for v in state.pmove.delta_angles.iter_mut() {
            *v = msg_read_short(net_message)? as i16;
        }
    }

    if attractloop {
        state.pmove.pm_type = PmType::Freeze; // demo playback
    }

    // parse the rest of the player_state_t
    if flags.contains(PS_VIEWOFFSET) {
        for v in state.viewoffset.iter_mut() {
            *v = msg_read_char(net_message)? as f32 * 0.25;
        }
    }

    if flags.contains(PS_VIEWANGLES) {
        for v in state.viewangles.iter_mut() {
            *v = msg_read_angle16(net_message)?;
        }
    }

    if flags.contains(PS_KICKANGLES) {
        for v in state.kick_angles.iter_mut() {
            *v = msg_read_char(net_message)? as f32 * 0.25;
        }
    }

    if flags.contains(PS_WEAPONINDEX) {
        state.gunindex = msg_read_byte(net_message)?;
    }

    if flags.contains(PS_WEAPONFRAME) {
        state.gunframe = msg_read_byte(net_message)?;
        for v in state.gunoffset.iter_mut() {
            *v = msg_read_char(net_message)? as f32 * 0.25;
        }
        for v in state.gunangles.iter_mut() {
            *v = msg_read_char(net_message)? as f32 * 0.25;
        }
    }

    if flags.contains(PS_BLEND) {
        for v in state.blend.iter_mut() {
            *v = msg_read_byte(net_message)? as f32 / 255.0;
        }
    }

    if flags.contains(PS_FOV) {
        state.fov = msg_read_byte(net_message)? as f32;
    }

    if flags.contains(PS_RDFLAGS) {
        state.rdflags = msg_read_byte(net_message)?;
    }

    // parse stats
    let statbits = msg_read_long(net_message)? as u32;
    for i in 0..MAX_STATS {
        if statbits & (1 << i) != 0 {
            state.stats[i] = msg_read_short(net_message)? as i16;
        }
    }

    Ok(())
}

/// CL_FireEntityEvents
pub fn cl_fire_entity_events(
    frame: &Frame,
    ent_state: &ClientEntState,
    callbacks: &mut dyn ClientCallbacks,
) {
    for s1 in ent_state.frame_entities(frame) {
        if s1.event != 0 {
            callbacks.cl_entity_event(s1);
        }

        // EF_TELEPORTER acts like an event, but is not cleared each frame
        if s1.effects & EF_TELEPORTER != 0 {
            callbacks.cl_teleporter_particles(s1);
        }
    }
}

/// CL_ParseFrame
pub fn cl_parse_frame(
    cl: &mut ClientState,
    cls: &mut ClientStatic,
    ent_state: &mut ClientEntState,
    net_message: &mut SizeBuf,
    cvars: &ClientCvars,
    callbacks: &mut dyn ClientCallbacks,
) -> Result<()> {
    let mut frame = Frame::default();

    frame.serverframe = msg_read_long(net_message)?;
    frame.deltaframe = msg_read_long(net_message)?;
    frame.servertime = frame.serverframe.wrapping_mul(SERVER_FRAMETIME_MS);

    // BIG HACK to let old demos continue to work
    if cls.server_protocol != PROTOCOL_NO_SURPRESSCOUNT {
        cl.surpresscount = msg_read_byte(net_message)?;
    }

    if cvars.cl_shownet == 3 {
        tracing::debug!("   frame:{}  delta:{}", frame.serverframe, frame.deltaframe);
    }

    // If the frame is delta compressed from data that we
    // no longer have available, we must suck up the rest of
    // the frame, but not use it, then ask for a non-compressed
    // message
    let old: Option<Frame> = if frame.deltaframe <= 0 {
        frame.valid = true; // uncompressed frame
        None
    } else {
        let old_frame = cl.frames[frame_index(frame.deltaframe)].clone();
        if !old_frame.valid {
            // should never happen
            tracing::warn!("Delta from invalid frame (not supposed to happen!).");
        }
        if old_frame.serverframe != frame.deltaframe {
            // The frame that the server did the delta from
            // is too old, so we can't reconstruct it properly.
            tracing::warn!("Delta frame too old.");
        } else if cl.parse_entities.wrapping_sub(old_frame.parse_entities) as usize
            > MAX_PARSE_ENTITIES - PARSE_ENTITIES_MARGIN
        {
            tracing::warn!("Delta parse_entities too old.");
        } else {
            frame.valid = old_frame.valid; // valid delta parse
        }
        Some(old_frame)
    };

    // clamp time
    if cl.time > frame.servertime {
        cl.time = frame.servertime;
    } else if cl.time < frame.servertime - SERVER_FRAMETIME_MS {
        cl.time = frame.servertime - SERVER_FRAMETIME_MS;
    }

    // read areabits
    let len = msg_read_byte(net_message)? as usize;
    let areabits = msg_read_data(net_message, len)?;
    let n = len.min(frame.areabits.len());
    frame.areabits[..n].copy_from_slice(&areabits[..n]);

    // read playerinfo
    let cmd = msg_read_byte(net_message)?;
    cl_shownet(net_message, cvars.cl_shownet, cmd);
    if cmd != SVC_PLAYERINFO {
        return Err(ProtocolError::UnexpectedCommand {
            context: "CL_ParseFrame",
            expected: "playerinfo",
            found: cmd,
        });
    }
    cl_parse_playerstate(old.as_ref(), &mut frame, net_message, cl.attractloop)?;

    // read packet entities
    let cmd = msg_read_byte(net_message)?;
    cl_shownet(net_message, cvars.cl_shownet, cmd);
    if cmd != SVC_PACKETENTITIES {
        return Err(ProtocolError::UnexpectedCommand {
            context: "CL_ParseFrame",
            expected: "packetentities",
            found: cmd,
        });
    }
    cl_parse_packet_entities(old.as_ref(), &mut frame, cl, ent_state, net_message, cvars.cl_shownet)?;

    // save the frame off in the backup array for later delta comparisons
    cl.frames[frame_index(frame.serverframe)] = frame.clone();
    cl.frame = frame;

    if !cl.frame.valid {
        cl.frame_state = FrameState::Invalid;
        return Ok(());
    }
    cl.frame_state = FrameState::Valid;

    // getting a valid frame message ends the connection process
    if cls.state != ConnState::Active {
        cls.state = ConnState::Active;
        for i in 0..3 {
            cl.predicted_origin[i] = cl.frame.playerstate.pmove.origin[i] as f32 * 0.125;
        }
        cl.predicted_angles = cl.frame.playerstate.viewangles;
        callbacks.cl_became_active();
    }

    // round trip of the command this frame acknowledges
    let ack = cls.netchan.incoming_acknowledged;
    let cmd_time = cl.cmd_time[(ack as usize) & CMD_MASK];
    if cmd_time > 0 {
        let ping = cls.realtime - cmd_time;
        if ping > 0 && ping < 1000 {
            cl.ping = ping;
        }
    }

    // fire entity events
    cl_fire_entity_events(&cl.frame, ent_state, callbacks);
    cl_check_prediction_error(cl, ack, cvars);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use proptest::prelude::*;

    fn parse_header(msg: &mut SizeBuf) -> (i32, EntityBits) {
        let mut counts = [0u32; 32];
        cl_parse_entity_bits(msg, &mut counts).unwrap()
    }

    fn sample_entity() -> EntityState {
        EntityState {
            number: 7,
            origin: [10.0, -20.0, 30.5],
            angles: [0.0, 90.0, 0.0],
            old_origin: [1.0, 2.0, 3.0],
            modelindex: 3,
            modelindex2: 4,
            frame: 12,
            skinnum: 2,
            effects: 0x10,
            renderfx: 4,
            solid: 31,
            sound: 9,
            event: 5,
            ..Default::default()
        }
    }

    // -------------------------------------------------------
    // Entity delta decoding
    // -------------------------------------------------------

    #[test]
    fn test_parse_delta_empty_mask_copies_reference() {
        let from = sample_entity();
        let mut msg = SizeBuf::from_bytes(&[0xAA]);
        let to = cl_parse_delta(&from, 7, EntityBits::empty(), &mut msg).unwrap();

        let mut expected = from;
        expected.old_origin = from.origin;
        expected.event = 0;
        assert_eq!(to, expected);
        assert_eq!(msg.readcount, 0);
    }

    #[test]
    fn test_field_width_selection() {
        assert_eq!(FieldWidth::select(U_SKIN8 | U_SKIN16, U_SKIN8, U_SKIN16), FieldWidth::Widest);
        assert_eq!(FieldWidth::select(U_SKIN8, U_SKIN8, U_SKIN16), FieldWidth::Narrow);
        assert_eq!(FieldWidth::select(U_SKIN16, U_SKIN8, U_SKIN16), FieldWidth::Wide);
        assert_eq!(FieldWidth::select(U_ORIGIN1, U_SKIN8, U_SKIN16), FieldWidth::Absent);

        let bytes = [1u8, 2, 3, 4];
        for (width, size) in [
            (FieldWidth::Widest, 4),
            (FieldWidth::Narrow, 1),
            (FieldWidth::Wide, 2),
            (FieldWidth::Absent, 0),
        ] {
            let mut msg = SizeBuf::from_bytes(&bytes);
            width.read(&mut msg).unwrap();
            assert_eq!(msg.readcount, size);
            assert_eq!(width.wire_size(), size as usize);
        }
    }

    #[test]
    fn test_parse_delta_wide_fields() {
        let from = EntityState { number: 40, ..Default::default() };
        let to = EntityState {
            number: 40,
            skinnum: 0x0102_0304,
            effects: 0x1234,
            renderfx: 200,
            frame: 300,
            ..from
        };
        let mut msg = SizeBuf::new(64);
        msg_write_delta_entity(&from, &to, &mut msg, false, false).unwrap();

        let (number, bits) = parse_header(&mut msg);
        assert_eq!(number, 40);
        assert!(bits.contains(U_SKIN8 | U_SKIN16 | U_EFFECTS16 | U_RENDERFX8 | U_FRAME16));
        let parsed = cl_parse_delta(&from, number, bits, &mut msg).unwrap();
        assert_eq!(parsed.skinnum, 0x0102_0304);
        assert_eq!(parsed.effects, 0x1234);
        assert_eq!(parsed.renderfx, 200);
        assert_eq!(parsed.frame, 300);
        assert_eq!(msg.remaining(), 0);
    }

    #[test]
    fn test_parse_delta_event_and_old_origin() {
        let from = EntityState { number: 2, origin: [8.0, 8.0, 8.0], event: 3, ..Default::default() };
        let to = EntityState {
            origin: [16.0, 8.0, 8.0],
            old_origin: [4.0, 4.0, 4.0],
            event: EV_FOOTSTEP,
            ..from
        };
        let mut msg = SizeBuf::new(64);
        msg_write_delta_entity(&from, &to, &mut msg, false, true).unwrap();

        let (number, bits) = parse_header(&mut msg);
        let parsed = cl_parse_delta(&from, number, bits, &mut msg).unwrap();
        assert_eq!(parsed.origin, [16.0, 8.0, 8.0]);
        assert_eq!(parsed.old_origin, [4.0, 4.0, 4.0]);
        assert_eq!(parsed.event, EV_FOOTSTEP);
    }

    #[test]
    fn test_parse_entity_bits_counts_profile() {
        let mut msg = SizeBuf::new(16);
        let from = EntityState { number: 1, ..Default::default() };
        let to = EntityState { solid: 5, ..from };
        msg_write_delta_entity(&from, &to, &mut msg, false, false).unwrap();
        let mut counts = [0u32; 32];
        let (_, bits) = cl_parse_entity_bits(&mut msg, &mut counts).unwrap();
        assert!(bits.contains(U_SOLID));
        assert_eq!(counts[27], 1);
        assert_eq!(counts[7], 1);
        assert_eq!(counts[15], 1);
        assert_eq!(counts[23], 1);
        assert_eq!(counts[0], 0);
    }

    #[test]
    fn test_parse_entity_bits_bad_number() {
        let mut msg = SizeBuf::new(16);
        msg_write_byte(&mut msg, (U_MOREBITS1.bits()) as i32);
        msg_write_byte(&mut msg, (U_NUMBER16.bits() >> 8) as i32);
        msg_write_short(&mut msg, MAX_EDICTS as i32);
        let mut counts = [0u32; 32];
        assert_eq!(
            cl_parse_entity_bits(&mut msg, &mut counts),
            Err(ProtocolError::BadEntityNumber { context: "CL_ParseEntityBits", number: 1024 })
        );
    }

    #[test]
    fn test_parse_delta_truncated() {
        let from = EntityState { number: 3, ..Default::default() };
        let mut msg = SizeBuf::from_bytes(&[0x10]);
        let err = cl_parse_delta(&from, 3, U_ORIGIN1, &mut msg).unwrap_err();
        assert!(matches!(err, ProtocolError::EndOfMessage { needed: 2, .. }));
    }

    // -------------------------------------------------------
    // Interpolation bookkeeping
    // -------------------------------------------------------

    fn tracked_entity(serverframe: i32) -> CEntity {
        let current = EntityState { number: 4, modelindex: 2, origin: [100.0, 0.0, 0.0], ..Default::default() };
        CEntity { current, prev: current, serverframe, ..Default::default() }
    }

    #[test]
    fn test_update_entity_teleport_threshold() {
        let mut ent = tracked_entity(9);
        let state = EntityState { origin: [613.0, 0.0, 0.0], old_origin: [100.0, 0.0, 0.0], ..ent.current };
        cl_update_entity(&mut ent, &state, 10);
        // moved 513 units: treated as not present last frame
        assert_eq!(ent.serverframe, 10);
        assert_eq!(ent.trailcount, 1024);
        assert_eq!(ent.prev.origin, state.old_origin);
        assert_eq!(ent.lerp_origin, state.old_origin);

        let mut ent = tracked_entity(9);
        let prev_current = ent.current;
        let state = EntityState { origin: [611.0, 0.0, 0.0], ..ent.current };
        cl_update_entity(&mut ent, &state, 10);
        // 511 units still lerps from the previous state
        assert_eq!(ent.trailcount, 0);
        assert_eq!(ent.prev, prev_current);
        assert_eq!(ent.current, state);
    }

    #[test]
    fn test_update_entity_model_change_forces_snap() {
        let mut ent = tracked_entity(9);
        let state = EntityState { modelindex: 3, old_origin: [1.0, 1.0, 1.0], ..ent.current };
        cl_update_entity(&mut ent, &state, 10);
        assert_eq!(ent.prev.origin, [1.0, 1.0, 1.0]);
        assert_eq!(ent.trailcount, 1024);
    }

    #[test]
    fn test_update_entity_teleport_event_seeds_from_origin() {
        let mut ent = tracked_entity(9);
        let state = EntityState {
            origin: [120.0, 0.0, 0.0],
            old_origin: [0.0, 50.0, 0.0],
            event: EV_PLAYER_TELEPORT,
            ..ent.current
        };
        cl_update_entity(&mut ent, &state, 10);
        assert_eq!(ent.prev.origin, state.origin);
        assert_eq!(ent.lerp_origin, state.origin);
    }

    #[test]
    fn test_update_entity_missing_last_frame() {
        let mut ent = tracked_entity(7);
        let state = EntityState { origin: [101.0, 0.0, 0.0], old_origin: [99.0, 0.0, 0.0], ..ent.current };
        cl_update_entity(&mut ent, &state, 10);
        assert_eq!(ent.prev.origin, [99.0, 0.0, 0.0]);
        assert_eq!(ent.trailcount, 1024);
        assert_eq!(ent.serverframe, 10);
    }

    // -------------------------------------------------------
    // Merge
    // -------------------------------------------------------

    /// Keyframe 1 holding entities 5, 9 and 12.
    fn setup_three_entities() -> (ClientState, ClientStatic, ClientEntState) {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic::default();
        let mut ents = ClientEntState::new();
        let entities = [
            test_entity(5, 1, [10.0, 0.0, 0.0]),
            test_entity(9, 2, [20.0, 0.0, 0.0]),
            test_entity(12, 3, [30.0, 0.0, 0.0]),
        ];
        let mut msg = SizeBuf::new(1400);
        write_keyframe(&mut msg, 1, &PlayerState::default(), &entities);
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();
        (cl, cls, ents)
    }

    #[test]
    fn test_merge_update_and_remove() {
        let (mut cl, mut cls, mut ents) = setup_three_entities();
        let old9 = *ents.frame_entities(&cl.frame).nth(1).unwrap();
        let new9 = EntityState { origin: [25.0, 0.0, 0.0], ..old9 };

        let mut msg = SizeBuf::new(1400);
        write_delta_frame(&mut msg, 2, 1, None, &PlayerState::default(), |msg| {
            msg_write_delta_entity(&old9, &new9, msg, false, false).unwrap();
            msg_write_remove_entity(msg, 12);
        });
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();

        assert!(cl.frame.valid);
        let numbers: Vec<i32> = ents.frame_entities(&cl.frame).map(|s| s.number).collect();
        assert_eq!(numbers, vec![5, 9]);
        assert_eq!(ents.frame_entities(&cl.frame).next(), Some(&test_entity(5, 1, [10.0, 0.0, 0.0])));
        let merged9 = ents.frame_entities(&cl.frame).nth(1).unwrap();
        assert_eq!(merged9.origin, [25.0, 0.0, 0.0]);
        assert_eq!(merged9.old_origin, [20.0, 0.0, 0.0]);
        assert_eq!(ents.cl_entities[9].prev.origin, [20.0, 0.0, 0.0]);
        assert_eq!(ents.cl_entities[12].serverframe, 1);
        assert_eq!(msg.remaining(), 0);
    }

    #[test]
    fn test_merge_unchanged_entity_copied_verbatim() {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic::default();
        let mut ents = ClientEntState::new();
        let five = EntityState {
            old_origin: [1.0, 2.0, 3.0],
            event: EV_FOOTSTEP,
            ..test_entity(5, 1, [10.0, 0.0, 0.0])
        };
        let mut msg = SizeBuf::new(1400);
        write_keyframe(&mut msg, 1, &PlayerState::default(), &[five]);
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();
        let old5 = *ents.frame_entities(&cl.frame).next().unwrap();

        // nothing mentions entity 5
        let mut msg = SizeBuf::new(1400);
        write_delta_frame(&mut msg, 2, 1, None, &PlayerState::default(), |_| {});
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();

        assert!(cl.frame.valid);
        let new5: Vec<EntityState> = ents.frame_entities(&cl.frame).copied().collect();
        assert_eq!(new5, vec![old5]);
        assert_eq!(ents.cl_entities[5].current, old5);
        assert_eq!(ents.cl_entities[5].serverframe, 2);
    }

    #[test]
    fn test_merge_steps_in_order() {
        let (mut cl, _cls, ents) = setup_three_entities();
        let oldframe = cl.frame.clone();

        // update 9, new entity 10 from baseline, remove 12
        let mut msg = SizeBuf::new(64);
        let old9 = *ents.frame_entities(&oldframe).nth(1).unwrap();
        msg_write_delta_entity(&old9, &EntityState { sound: 1, ..old9 }, &mut msg, false, false).unwrap();
        msg_write_delta_entity(
            &EntityState::default(),
            &test_entity(10, 4, [0.0; 3]),
            &mut msg,
            false,
            true,
        )
        .unwrap();
        msg_write_remove_entity(&mut msg, 12);
        msg_write_short(&mut msg, 0);

        let mut merge = PacketEntityMerge::new(Some(&oldframe));
        let mut steps = Vec::new();
        while let Some(step) = merge
            .next_step(&ents.cl_parse_entities, &mut msg, &mut cl.bitcounts)
            .unwrap()
        {
            // skip field data the way the dispatcher would
            match &step {
                MergeStep::DeltaFromPrevious { number, bits, from } => {
                    cl_parse_delta(from, *number, *bits, &mut msg).unwrap();
                }
                MergeStep::DeltaFromBaseline { number, bits } => {
                    cl_parse_delta(&EntityState::default(), *number, *bits, &mut msg).unwrap();
                }
                _ => {}
            }
            steps.push(step);
        }

        assert_eq!(steps.len(), 4);
        assert!(matches!(&steps[0], MergeStep::Unchanged(s) if s.number == 5));
        assert!(matches!(&steps[1], MergeStep::DeltaFromPrevious { number: 9, .. }));
        assert!(matches!(&steps[2], MergeStep::DeltaFromBaseline { number: 10, .. }));
        assert_eq!(steps[3], MergeStep::Removed { number: 12, oldnum: 12 });
        assert_eq!(merge.oldnum(), ENTITY_SENTINEL);
    }

    #[test]
    fn test_merge_flushes_remaining_old_entities() {
        let (mut cl, mut cls, mut ents) = setup_three_entities();
        let mut msg = SizeBuf::new(64);
        write_delta_frame(&mut msg, 2, 1, None, &PlayerState::default(), |_| {});
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();
        let numbers: Vec<i32> = ents.frame_entities(&cl.frame).map(|s| s.number).collect();
        assert_eq!(numbers, vec![5, 9, 12]);
        assert_eq!(cl.frame.parse_entities, 3);
        assert_eq!(cl.parse_entities, 6);
    }

    #[test]
    fn test_remove_mismatch_is_not_fatal() {
        let (mut cl, mut cls, mut ents) = setup_three_entities();
        let mut msg = SizeBuf::new(64);
        // 7 was never in the frame; the cursor (at 9) still advances
        write_delta_frame(&mut msg, 2, 1, None, &PlayerState::default(), |msg| {
            msg_write_remove_entity(msg, 7);
        });
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();
        let numbers: Vec<i32> = ents.frame_entities(&cl.frame).map(|s| s.number).collect();
        assert_eq!(numbers, vec![5, 12]);
    }

    #[test]
    fn test_new_entity_uses_baseline() {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic::default();
        let mut ents = ClientEntState::new();
        ents.cl_entities[20].baseline = EntityState {
            number: 20,
            modelindex: 6,
            origin: [64.0, 64.0, 0.0],
            ..Default::default()
        };
        let mut msg = SizeBuf::new(64);
        write_delta_frame(&mut msg, 1, 0, None, &PlayerState::default(), |msg| {
            // only the frame changes relative to the baseline
            msg_write_byte(msg, U_FRAME8.bits() as i32);
            msg_write_byte(msg, 20);
            msg_write_byte(msg, 3);
        });
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();
        let s = ents.frame_entities(&cl.frame).next().unwrap();
        assert_eq!(s.modelindex, 6);
        assert_eq!(s.origin, [64.0, 64.0, 0.0]);
        assert_eq!(s.frame, 3);
    }

    // -------------------------------------------------------
    // Player state
    // -------------------------------------------------------

    #[test]
    fn test_parse_playerstate_from_reference() {
        let mut old = Frame::default();
        old.playerstate.pmove.origin = [80, 16, 24];
        old.playerstate.stats[3] = 55;
        old.playerstate.fov = 110.0;

        let mut ps = old.playerstate.clone();
        ps.pmove.velocity = [40, 0, -8];
        ps.viewoffset = [0.0, 0.0, 22.0];
        ps.kick_angles = [-1.25, 0.0, 0.5];
        ps.blend = [1.0, 0.0, 0.0, 0.2];
        ps.stats[0] = 100;

        let mut msg = SizeBuf::new(128);
        msg_write_delta_playerstate(Some(&old.playerstate), &ps, &mut msg);
        msg.readcount = 1; // command byte

        let mut frame = Frame::default();
        cl_parse_playerstate(Some(&old), &mut frame, &mut msg, false).unwrap();
        let got = &frame.playerstate;
        assert_eq!(got.pmove.origin, [80, 16, 24]);
        assert_eq!(got.pmove.velocity, [40, 0, -8]);
        assert_eq!(got.viewoffset, [0.0, 0.0, 22.0]);
        assert_eq!(got.kick_angles, [-1.25, 0.0, 0.5]);
        assert_eq!(got.blend[0], 1.0);
        assert!((got.blend[3] - 51.0 / 255.0).abs() < 1e-6);
        assert_eq!(got.fov, 110.0);
        assert_eq!(got.stats[0], 100);
        assert_eq!(got.stats[3], 55);
        assert_eq!(msg.remaining(), 0);
    }

    #[test]
    fn test_parse_playerstate_attractloop_freezes() {
        let mut ps = PlayerState::default();
        ps.pmove.pm_type = PmType::Spectator;
        let mut msg = SizeBuf::new(64);
        msg_write_delta_playerstate(None, &ps, &mut msg);
        msg.readcount = 1;
        let mut frame = Frame::default();
        cl_parse_playerstate(None, &mut frame, &mut msg, true).unwrap();
        assert_eq!(frame.playerstate.pmove.pm_type, PmType::Freeze);
    }

    #[test]
    fn test_parse_playerstate_unknown_pm_type() {
        let mut msg = SizeBuf::new(16);
        msg_write_short(&mut msg, PS_M_TYPE.bits() as i32);
        msg_write_byte(&mut msg, 42);
        msg_write_long(&mut msg, 0);
        msg_begin_reading(&mut msg);
        let mut frame = Frame::default();
        frame.playerstate.pmove.pm_type = PmType::Dead;
        cl_parse_playerstate(None, &mut frame, &mut msg, false).unwrap();
        assert_eq!(frame.playerstate.pmove.pm_type, PmType::Normal);
    }

    // -------------------------------------------------------
    // Frame assembly
    // -------------------------------------------------------

    #[test]
    fn test_keyframe_activates_client() {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic { state: ConnState::Connected, ..Default::default() };
        let mut ents = ClientEntState::new();
        let mut callbacks = RecordingCallbacks::default();

        let mut ps = PlayerState::default();
        ps.pmove.origin = [800, -160, 24];
        ps.viewangles = [0.0, 90.0, 0.0];
        let mut msg = SizeBuf::new(256);
        write_keyframe(&mut msg, 5, &ps, &[]);
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut callbacks)
            .unwrap();

        assert_eq!(cls.state, ConnState::Active);
        assert_eq!(cl.frame_state, FrameState::Valid);
        assert_eq!(cl.frame.servertime, 500);
        assert_eq!(cl.predicted_origin, [100.0, -20.0, 3.0]);
        assert_eq!(cl.predicted_angles, [0.0, 90.0, 0.0]);
        assert_eq!(callbacks.became_active, 1);
        assert_eq!(cl.retained_frame(5).map(|f| f.valid), Some(true));

        // a second valid frame does not signal again
        let mut msg = SizeBuf::new(256);
        write_delta_frame(&mut msg, 6, 5, Some(&ps), &ps, |_| {});
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut callbacks)
            .unwrap();
        assert_eq!(callbacks.became_active, 1);
    }

    #[test]
    fn test_delta_from_overwritten_frame_is_invalid() {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic::default();
        let mut ents = ClientEntState::new();

        let mut msg = SizeBuf::new(256);
        write_keyframe(&mut msg, 3, &PlayerState::default(), &[test_entity(1, 1, [0.0; 3])]);
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();

        // frame 19 shares slot 3
        let mut msg = SizeBuf::new(256);
        write_keyframe(&mut msg, 19, &PlayerState::default(), &[]);
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();
        assert!(cl.retained_frame(3).is_none());

        let mut msg = SizeBuf::new(256);
        write_delta_frame(&mut msg, 20, 3, None, &PlayerState::default(), |msg| {
            msg_write_delta_entity(
                &EntityState::default(),
                &test_entity(2, 5, [8.0, 0.0, 0.0]),
                msg,
                false,
                true,
            )
            .unwrap();
        });
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();

        assert!(!cl.frame.valid);
        assert_eq!(cl.frame_state, FrameState::Invalid);
        assert_eq!(msg.remaining(), 0);
        assert_eq!(cl.frames[frame_index(20)].serverframe, 20);
    }

    #[test]
    fn test_delta_parse_entities_too_old() {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic::default();
        let mut ents = ClientEntState::new();

        let mut msg = SizeBuf::new(256);
        write_keyframe(&mut msg, 1, &PlayerState::default(), &[test_entity(1, 1, [0.0; 3])]);
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();

        // pretend many entities were parsed since
        cl.parse_entities = cl.parse_entities.wrapping_add((MAX_PARSE_ENTITIES - PARSE_ENTITIES_MARGIN) as u32);

        let mut msg = SizeBuf::new(256);
        write_delta_frame(&mut msg, 2, 1, None, &PlayerState::default(), |_| {});
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();
        assert!(!cl.frame.valid);
    }

    #[test]
    fn test_delta_from_invalid_frame_stays_invalid() {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic::default();
        let mut ents = ClientEntState::new();
        cl.frames[frame_index(4)] = Frame { serverframe: 4, valid: false, ..Default::default() };

        let mut msg = SizeBuf::new(256);
        write_delta_frame(&mut msg, 5, 4, None, &PlayerState::default(), |_| {});
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();
        assert!(!cl.frame.valid);
        assert_eq!(cls.state, ConnState::Disconnected);
    }

    #[test]
    fn test_frame_requires_playerinfo() {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic::default();
        let mut ents = ClientEntState::new();

        let mut msg = SizeBuf::new(64);
        write_frame_header(&mut msg, 1, 0, &[]);
        msg_write_byte(&mut msg, SVC_PACKETENTITIES);
        msg_write_short(&mut msg, 0);
        let err = cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnexpectedCommand {
                context: "CL_ParseFrame",
                expected: "playerinfo",
                found: SVC_PACKETENTITIES,
            }
        );
    }

    #[test]
    fn test_frame_areabits_and_time_clamp() {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic::default();
        let mut ents = ClientEntState::new();
        cl.time = 5000;

        let mut msg = SizeBuf::new(256);
        write_frame_header(&mut msg, 30, 0, &[0xff, 0x01]);
        msg_write_delta_playerstate(None, &PlayerState::default(), &mut msg);
        msg_write_byte(&mut msg, SVC_PACKETENTITIES);
        msg_write_short(&mut msg, 0);
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();

        assert_eq!(cl.time, 3000);
        assert_eq!(&cl.frame.areabits[..3], &[0xff, 0x01, 0x00]);

        cl.time = 0;
        let mut msg = SizeBuf::new(256);
        write_delta_frame(&mut msg, 31, 30, None, &PlayerState::default(), |_| {});
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();
        assert_eq!(cl.time, 3000);
    }

    #[test]
    fn test_entity_events_fire() {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic::default();
        let mut ents = ClientEntState::new();
        let mut callbacks = RecordingCallbacks::default();

        let footstep = EntityState { event: EV_FOOTSTEP, ..test_entity(3, 1, [0.0; 3]) };
        let pad = EntityState { effects: EF_TELEPORTER, ..test_entity(4, 2, [0.0; 3]) };
        let quiet = test_entity(6, 3, [0.0; 3]);
        let mut msg = SizeBuf::new(256);
        write_keyframe(&mut msg, 1, &PlayerState::default(), &[footstep, pad, quiet]);
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut callbacks)
            .unwrap();

        assert_eq!(callbacks.events, vec![(3, EV_FOOTSTEP)]);
        assert_eq!(callbacks.teleporters, vec![4]);
    }

    #[test]
    fn test_frame_records_ping() {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic::default();
        let mut ents = ClientEntState::new();
        cls.netchan.incoming_acknowledged = 70;
        cl.cmd_time[70 & CMD_MASK] = 1000;
        cls.realtime = 1085;

        let mut msg = SizeBuf::new(256);
        write_keyframe(&mut msg, 1, &PlayerState::default(), &[]);
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();
        assert_eq!(cl.ping, 85);
    }

    #[test]
    fn test_old_protocol_has_no_surpresscount() {
        let mut cl = ClientState::default();
        let mut cls = ClientStatic { server_protocol: PROTOCOL_NO_SURPRESSCOUNT, ..Default::default() };
        let mut ents = ClientEntState::new();

        let mut msg = SizeBuf::new(64);
        msg_write_long(&mut msg, 1);
        msg_write_long(&mut msg, -1);
        msg_write_byte(&mut msg, 0); // areabits length
        msg_write_delta_playerstate(None, &PlayerState::default(), &mut msg);
        msg_write_byte(&mut msg, SVC_PACKETENTITIES);
        msg_write_short(&mut msg, 0);
        cl_parse_frame(&mut cl, &mut cls, &mut ents, &mut msg, &ClientCvars::default(), &mut NullCallbacks)
            .unwrap();
        assert!(cl.frame.valid);
        assert_eq!(msg.remaining(), 0);
    }

    #[test]
    fn test_client_ent_state_clear() {
        let mut ents = ClientEntState::new();
        ents.cl_entities[5].baseline.modelindex = 3;
        ents.cl_parse_entities[10].number = 4;
        ents.clear();
        assert_eq!(ents.cl_entities[5].baseline.modelindex, 0);
        assert_eq!(ents.cl_parse_entities[10].number, 0);
        assert_eq!(ents.cl_entities.len(), MAX_EDICTS);
    }

    // -------------------------------------------------------
    // Properties
    // -------------------------------------------------------

    prop_compose! {
        fn wire_entity()(
            number in 1i32..MAX_EDICTS as i32,
            origin in prop::array::uniform3(-4096i32..4096),
            angles in prop::array::uniform3(0i32..256),
            models in prop::array::uniform4(0i32..256),
            frame in 0i32..0x8000,
            skinnum in any::<i32>(),
            effects in any::<u32>(),
            renderfx in any::<i32>(),
            solid in -0x8000i32..0x8000,
            sound in 0i32..256,
            event in 0i32..256,
        ) -> EntityState {
            EntityState {
                number,
                origin: origin.map(|v| v as f32 * 0.125),
                angles: angles.map(|v| (v as i8) as f32 * (360.0 / 256.0)),
                old_origin: [0.0; 3],
                modelindex: models[0],
                modelindex2: models[1],
                modelindex3: models[2],
                modelindex4: models[3],
                frame,
                skinnum,
                effects,
                renderfx,
                solid,
                sound,
                event,
            }
        }
    }

    proptest! {
        #[test]
        fn prop_empty_mask_is_identity(from in wire_entity()) {
            let mut msg = SizeBuf::new(0);
            let to = cl_parse_delta(&from, from.number, EntityBits::empty(), &mut msg).unwrap();
            prop_assert_eq!(to.origin, from.origin);
            prop_assert_eq!(to.old_origin, from.origin);
            prop_assert_eq!(to.event, 0);
            prop_assert_eq!(EntityState { old_origin: from.old_origin, event: from.event, ..to }, from);
        }

        #[test]
        fn prop_delta_reconstructs_target(from in wire_entity(), target in wire_entity()) {
            let to = EntityState { number: from.number, old_origin: from.origin, ..target };
            let mut msg = SizeBuf::new(128);
            msg_write_delta_entity(&from, &to, &mut msg, true, false).unwrap();
            let mut counts = [0u32; 32];
            let (number, bits) = cl_parse_entity_bits(&mut msg, &mut counts).unwrap();
            let parsed = cl_parse_delta(&from, number, bits, &mut msg).unwrap();
            prop_assert_eq!(msg.remaining(), 0);
            prop_assert_eq!(parsed, to);
        }
    }
}
