// q_shared.rs -- types shared between the protocol core and its collaborators
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2 or later.

pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

// ============================================================
// Limits
// ============================================================

pub const MAX_CLIENTS: usize = 256;       // absolute limit
pub const MAX_EDICTS: usize = 1024;       // must change protocol to increase more
pub const MAX_LIGHTSTYLES: usize = 256;
pub const MAX_MODELS: usize = 256;        // these are sent over the net as bytes
pub const MAX_SOUNDS: usize = 256;        // so they cannot be blindly increased
pub const MAX_IMAGES: usize = 256;
pub const MAX_ITEMS: usize = 256;
pub const MAX_GENERAL: usize = MAX_CLIENTS * 2;
pub const MAX_STATS: usize = 32;
pub const MAX_MAP_AREAS: usize = 256;

// ============================================================
// Config strings
// ============================================================

pub const CS_NAME: usize = 0;
pub const CS_AIRACCEL: usize = 29;
pub const CS_MODELS: usize = 32;
pub const CS_SOUNDS: usize = CS_MODELS + MAX_MODELS;
pub const CS_IMAGES: usize = CS_SOUNDS + MAX_SOUNDS;
pub const CS_LIGHTS: usize = CS_IMAGES + MAX_IMAGES;
pub const CS_ITEMS: usize = CS_LIGHTS + MAX_LIGHTSTYLES;
pub const CS_PLAYERSKINS: usize = CS_ITEMS + MAX_ITEMS;
pub const CS_GENERAL: usize = CS_PLAYERSKINS + MAX_CLIENTS;
pub const MAX_CONFIGSTRINGS: usize = CS_GENERAL + MAX_GENERAL;

// ============================================================
// Cvar flags
// ============================================================

pub const CVAR_ZERO: i32 = 0;
pub const CVAR_ARCHIVE: i32 = 1;  // set to cause it to be saved to vars.rc
pub const CVAR_NOSET: i32 = 8;    // don't allow change from console at all

// ============================================================
// Player movement
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PmType {
    Normal = 0,
    Spectator = 1,
    Dead = 2,
    Gib = 3,
    /// No movement at all; forced during demo playback.
    Freeze = 4,
}

impl PmType {
    /// Unknown values decode as `Normal`.
    pub fn from_wire(b: i32) -> Self {
        match b {
            1 => PmType::Spectator,
            2 => PmType::Dead,
            3 => PmType::Gib,
            4 => PmType::Freeze,
            _ => PmType::Normal,
        }
    }
}

pub const PMF_DUCKED: u8 = 1;
pub const PMF_JUMP_HELD: u8 = 2;
pub const PMF_ON_GROUND: u8 = 4;
pub const PMF_TIME_WATERJUMP: u8 = 8;
pub const PMF_TIME_LAND: u8 = 16;
pub const PMF_TIME_TELEPORT: u8 = 32;
pub const PMF_NO_PREDICTION: u8 = 64;

/// Communicated bit-accurate between server and client for prediction sync.
/// No floats, only integers. Origin and velocity are 12.3 fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmoveState {
    pub pm_type: PmType,
    pub origin: [i16; 3],
    pub velocity: [i16; 3],
    pub pm_flags: u8,
    pub pm_time: u8,
    pub gravity: i16,
    pub delta_angles: [i16; 3],
}

impl Default for PmoveState {
    fn default() -> Self {
        Self {
            pm_type: PmType::Normal,
            origin: [0; 3],
            velocity: [0; 3],
            pm_flags: 0,
            pm_time: 0,
            gravity: 0,
            delta_angles: [0; 3],
        }
    }
}

pub const BUTTON_ATTACK: u8 = 1;
pub const BUTTON_USE: u8 = 2;
pub const BUTTON_ANY: u8 = 128;

/// One sampled input tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCmd {
    pub msec: u8,
    pub buttons: u8,
    pub angles: [i16; 3],
    pub forwardmove: i16,
    pub sidemove: i16,
    pub upmove: i16,
    pub impulse: u8,
    pub lightlevel: u8,
}

/// Input and output of one movement simulator step.
///
/// The simulator reads `s` and `cmd`, and writes back `s`, the view angles
/// and whatever it found about the ground and water.
#[derive(Debug, Clone)]
pub struct PmoveData {
    pub s: PmoveState,
    pub cmd: UserCmd,
    pub snapinitial: bool,
    pub viewangles: Vec3,
    pub viewheight: f32,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub groundentity: i32, // entity index, -1 = none
    pub watertype: i32,
    pub waterlevel: i32,
}

impl Default for PmoveData {
    fn default() -> Self {
        Self {
            s: PmoveState::default(),
            cmd: UserCmd::default(),
            snapinitial: false,
            viewangles: [0.0; 3],
            viewheight: 0.0,
            mins: [0.0; 3],
            maxs: [0.0; 3],
            groundentity: -1,
            watertype: 0,
            waterlevel: 0,
        }
    }
}

// ============================================================
// Entity effects and render flags referenced by the client
// ============================================================

pub const EF_ROTATE: u32 = 0x00000001;
pub const EF_GIB: u32 = 0x00000002;
pub const EF_TELEPORTER: u32 = 0x00020000;

pub const RF_BEAM: i32 = 128;

// ============================================================
// Entity events
// ============================================================

pub const EV_NONE: i32 = 0;
pub const EV_ITEM_RESPAWN: i32 = 1;
pub const EV_FOOTSTEP: i32 = 2;
pub const EV_FALLSHORT: i32 = 3;
pub const EV_FALL: i32 = 4;
pub const EV_FALLFAR: i32 = 5;
pub const EV_PLAYER_TELEPORT: i32 = 6;
pub const EV_OTHER_TELEPORT: i32 = 7;

#[inline]
pub fn is_teleport_event(event: i32) -> bool {
    event == EV_PLAYER_TELEPORT || event == EV_OTHER_TELEPORT
}

// ============================================================
// Entity state
// ============================================================

/// Wire-level state of one entity. Every field is plain data, so states are
/// copied by value between the baseline, the parse ring and `CEntity`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntityState {
    pub number: i32,
    pub origin: Vec3,
    pub angles: Vec3,
    pub old_origin: Vec3, // for lerping
    pub modelindex: i32,
    pub modelindex2: i32,
    pub modelindex3: i32,
    pub modelindex4: i32,
    pub frame: i32,
    pub skinnum: i32,
    pub effects: u32,
    pub renderfx: i32,
    pub solid: i32,
    pub sound: i32,
    pub event: i32, // impulse events, cleared every frame
}

// ============================================================
// Player state
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub pmove: PmoveState,
    pub viewangles: Vec3,
    pub viewoffset: Vec3,
    pub kick_angles: Vec3,
    pub gunangles: Vec3,
    pub gunoffset: Vec3,
    pub gunindex: i32,
    pub gunframe: i32,
    pub blend: [f32; 4],
    pub fov: f32,
    pub rdflags: i32,
    pub stats: [i16; MAX_STATS],
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            pmove: PmoveState::default(),
            viewangles: [0.0; 3],
            viewoffset: [0.0; 3],
            kick_angles: [0.0; 3],
            gunangles: [0.0; 3],
            gunoffset: [0.0; 3],
            gunindex: 0,
            gunframe: 0,
            blend: [0.0; 4],
            fov: 90.0,
            rdflags: 0,
            stats: [0; MAX_STATS],
        }
    }
}

// ============================================================
// Angle/short conversion
// ============================================================

#[inline]
pub fn angle2short(x: f32) -> i32 {
    ((x * 65536.0 / 360.0) as i32) & 65535
}

#[inline]
pub fn short2angle(x: i16) -> f32 {
    (x as f32) * (360.0 / 65536.0)
}

#[inline]
pub fn vector_clear(v: &mut Vec3) {
    *v = [0.0; 3];
}
