// client.rs -- primary header for client
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2 or later.

use q2sync_common::q_shared::{
    EntityState, PlayerState, UserCmd, Vec3, MAX_CONFIGSTRINGS, MAX_MAP_AREAS,
};
use q2sync_common::qcommon::{NetChan, UPDATE_BACKUP, UPDATE_MASK};

// ============================================================
// Client constants
// ============================================================

/// Commands kept for prediction replay; must be a power of two.
pub const CMD_BACKUP: usize = 64;
pub const CMD_MASK: usize = CMD_BACKUP - 1;

/// Entity states kept across frames for delta decoding; must be a power of two.
pub const MAX_PARSE_ENTITIES: usize = 1024;

/// A delta reference is only trusted while its entities are at least this far
/// from being overwritten in the parse ring.
pub const PARSE_ENTITIES_MARGIN: usize = 128;

/// Server tick length. Frame numbers convert to server time with it.
pub const SERVER_FRAMETIME_MS: i32 = 100;

/// Ring slot of a non-masked parse entity counter.
#[inline]
pub fn parse_entity_index(counter: u32) -> usize {
    (counter as usize) & (MAX_PARSE_ENTITIES - 1)
}

/// Ring slot of a server frame number.
#[inline]
pub fn frame_index(serverframe: i32) -> usize {
    (serverframe & UPDATE_MASK) as usize
}

// ============================================================
// frame_t
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub valid: bool,               // cleared if delta parsing was invalid
    pub serverframe: i32,
    pub servertime: i32,           // server time the message is valid for (in msec)
    pub deltaframe: i32,
    pub areabits: [u8; MAX_MAP_AREAS / 8], // portalarea visibility bits
    pub playerstate: PlayerState,
    pub num_entities: i32,
    pub parse_entities: u32,       // non-masked index into cl_parse_entities array
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            valid: false,
            serverframe: 0,
            servertime: 0,
            deltaframe: 0,
            areabits: [0u8; MAX_MAP_AREAS / 8],
            playerstate: PlayerState::default(),
            num_entities: 0,
            parse_entities: 0,
        }
    }
}

/// Where snapshot assembly stands for the current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    /// No server data received yet.
    #[default]
    Empty,
    /// Level data received, waiting for the first frame that can be trusted.
    AwaitingKeyframe,
    /// The latest frame was decoded against a retained reference.
    Valid,
    /// The latest frame referenced something no longer retained. It was
    /// consumed but must not be used; the next resolvable frame recovers.
    Invalid,
}

// ============================================================
// centity_t -- client entity
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct CEntity {
    pub baseline: EntityState,     // delta from this if not from a previous frame
    pub current: EntityState,
    pub prev: EntityState,         // will always be valid, but might just be a copy of current
    pub serverframe: i32,          // if not current, this ent isn't in the frame
    pub trailcount: i32,           // for diminishing grenade trails
    pub lerp_origin: Vec3,         // for trails (variable hz)
}

/// Entity serverframe marker that forces the renderer to snap instead of lerp.
pub const NO_LERP_SERVERFRAME: i32 = -99;

// ============================================================
// client_state_t -- wiped completely at every server map change
// ============================================================

#[derive(Debug)]
pub struct ClientState {
    pub parse_entities: u32,       // index (not anded off) into cl_parse_entities[]

    pub cmds: [UserCmd; CMD_BACKUP],           // each message will send several old cmds
    pub cmd_time: [i32; CMD_BACKUP],           // time sent, for calculating pings
    pub predicted_origins: [[i16; 3]; CMD_BACKUP], // for debug comparing against server

    pub predicted_step: f32,                   // for stair up smoothing
    pub predicted_step_time: u32,

    pub predicted_origin: Vec3,    // generated by CL_PredictMovement
    pub predicted_angles: Vec3,
    pub prediction_error: Vec3,

    pub frame: Frame,              // received from server
    pub frame_state: FrameState,
    pub surpresscount: i32,        // number of messages rate suppressed
    pub frames: Vec<Frame>,        // [UPDATE_BACKUP]

    // the client maintains its own idea of view angles, which are
    // sent to the server each frame. It is cleared to 0 upon entering each level.
    pub viewangles: Vec3,

    pub time: i32,                 // this is the time value that the client
                                   // is rendering at. always <= cls.realtime

    //
    // transient data from server
    //
    pub layout: String,            // general 2D overlay

    //
    // server state information
    //
    pub attractloop: bool,         // running the attract loop, any key will menu
    pub servercount: i32,          // server identification for prespawns
    pub gamedir: String,
    pub playernum: i32,
    pub levelname: String,

    pub configstrings: Vec<String>, // [MAX_CONFIGSTRINGS]

    /// Net profiling: how often each entity change bit was received.
    pub bitcounts: [u32; 32],
    /// Round trip of the last acknowledged command, in msec.
    pub ping: i32,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            parse_entities: 0,
            cmds: [UserCmd::default(); CMD_BACKUP],
            cmd_time: [0; CMD_BACKUP],
            predicted_origins: [[0i16; 3]; CMD_BACKUP],
            predicted_step: 0.0,
            predicted_step_time: 0,
            predicted_origin: [0.0; 3],
            predicted_angles: [0.0; 3],
            prediction_error: [0.0; 3],
            frame: Frame::default(),
            frame_state: FrameState::Empty,
            surpresscount: 0,
            frames: vec![Frame::default(); UPDATE_BACKUP as usize],
            viewangles: [0.0; 3],
            time: 0,
            layout: String::new(),
            attractloop: false,
            servercount: 0,
            gamedir: String::new(),
            playernum: 0,
            levelname: String::new(),
            configstrings: vec![String::new(); MAX_CONFIGSTRINGS],
            bitcounts: [0; 32],
            ping: 0,
        }
    }
}

impl ClientState {
    /// The retained frame for `serverframe`, if its ring slot has not been
    /// reused by a later frame.
    pub fn retained_frame(&self, serverframe: i32) -> Option<&Frame> {
        let frame = &self.frames[frame_index(serverframe)];
        (frame.serverframe == serverframe).then_some(frame)
    }
}

// ============================================================
// connstate_t -- connection state
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum ConnState {
    Uninitialized = 0,
    Disconnected = 1,  // not talking to a server
    Connecting = 2,    // sending request packets to the server
    Connected = 3,     // netchan_t established, waiting for svc_serverdata
    Active = 4,        // game views should be displayed
}

// ============================================================
// client_static_t -- persistent through server connections
// ============================================================

#[derive(Debug, Clone)]
pub struct ClientStatic {
    pub state: ConnState,

    pub realtime: i32,             // always increasing, no clamping, etc
    pub frametime: f32,            // seconds since last frame

    pub netchan: NetChan,
    pub server_protocol: i32,      // in case we are doing some kind of version hack
}

impl Default for ClientStatic {
    fn default() -> Self {
        Self {
            state: ConnState::Disconnected,
            realtime: 0,
            frametime: 0.0,
            netchan: NetChan::default(),
            server_protocol: 0,
        }
    }
}

// ============================================================
// Console variables read by the client each tick
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientCvars {
    pub cl_predict: bool,
    pub cl_showmiss: bool,
    pub cl_shownet: i32,
    pub paused: bool,
}

impl Default for ClientCvars {
    fn default() -> Self {
        Self {
            cl_predict: true,
            cl_showmiss: false,
            cl_shownet: 0,
            paused: false,
        }
    }
}
