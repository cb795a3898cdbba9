// qcommon.rs -- protocol definitions shared by the message codecs and the client
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2 or later.

// ============================================================
// SizeBuf
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct SizeBuf {
    pub allow_overflow: bool,
    pub overflowed: bool,
    pub data: Vec<u8>,
    pub maxsize: i32,
    pub cursize: i32,
    pub readcount: i32,
}

impl SizeBuf {
    pub fn new(maxsize: i32) -> Self {
        Self {
            allow_overflow: false,
            overflowed: false,
            data: vec![0u8; maxsize.max(0) as usize],
            maxsize,
            cursize: 0,
            readcount: 0,
        }
    }

    /// Wrap a received datagram for reading. The read cursor starts at 0.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len() as i32;
        Self {
            allow_overflow: false,
            overflowed: false,
            data: bytes.to_vec(),
            maxsize: len,
            cursize: len,
            readcount: 0,
        }
    }

    pub fn clear(&mut self) {
        self.cursize = 0;
        self.overflowed = false;
    }

    /// Bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.cursize as usize]
    }

    /// Bytes not yet consumed by the reader.
    pub fn remaining(&self) -> i32 {
        self.cursize - self.readcount
    }
}

// ============================================================
// Protocol
// ============================================================

/// Original Quake 2 protocol version
pub const PROTOCOL_VERSION: i32 = 34;

/// R1Q2 enhanced protocol version
pub const PROTOCOL_R1Q2: i32 = 35;

/// Q2Pro enhanced protocol version (extends R1Q2)
pub const PROTOCOL_Q2PRO: i32 = 36;

pub const MIN_SUPPORTED_PROTOCOL: i32 = PROTOCOL_VERSION;
pub const MAX_SUPPORTED_PROTOCOL: i32 = PROTOCOL_Q2PRO;

/// Old servers omit the suppress-count byte in svc_frame.
pub const PROTOCOL_NO_SURPRESSCOUNT: i32 = 26;

#[inline]
pub fn is_supported_protocol(version: i32) -> bool {
    (MIN_SUPPORTED_PROTOCOL..=MAX_SUPPORTED_PROTOCOL).contains(&version)
}

pub const MAX_MSGLEN: usize = 1400;
pub const MAX_MSGLEN_R1Q2: usize = 4096;

// ============================================================
// Frame history
// ============================================================

/// Copies of entity_state_t to keep buffered; must be a power of two.
pub const UPDATE_BACKUP: i32 = 16;
pub const UPDATE_MASK: i32 = UPDATE_BACKUP - 1;

// ============================================================
// Server-to-client ops
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SvcOps {
    Bad = 0,
    MuzzleFlash,
    MuzzleFlash2,
    TempEntity,
    Layout,
    Inventory,
    Nop,
    Disconnect,
    Reconnect,
    Sound,
    Print,
    StuffText,
    ServerData,
    ConfigString,
    SpawnBaseline,
    CenterPrint,
    Download,
    PlayerInfo,
    PacketEntities,
    DeltaPacketEntities,
    Frame,
}

impl SvcOps {
    pub fn from_i32(cmd: i32) -> Option<Self> {
        use SvcOps::*;
        const TABLE: [SvcOps; 21] = [
            Bad,
            MuzzleFlash,
            MuzzleFlash2,
            TempEntity,
            Layout,
            Inventory,
            Nop,
            Disconnect,
            Reconnect,
            Sound,
            Print,
            StuffText,
            ServerData,
            ConfigString,
            SpawnBaseline,
            CenterPrint,
            Download,
            PlayerInfo,
            PacketEntities,
            DeltaPacketEntities,
            Frame,
        ];
        usize::try_from(cmd).ok().and_then(|i| TABLE.get(i).copied())
    }
}

pub const SVC_BAD: i32 = SvcOps::Bad as i32;
pub const SVC_LAYOUT: i32 = SvcOps::Layout as i32;
pub const SVC_INVENTORY: i32 = SvcOps::Inventory as i32;
pub const SVC_NOP: i32 = SvcOps::Nop as i32;
pub const SVC_DISCONNECT: i32 = SvcOps::Disconnect as i32;
pub const SVC_RECONNECT: i32 = SvcOps::Reconnect as i32;
pub const SVC_PRINT: i32 = SvcOps::Print as i32;
pub const SVC_STUFFTEXT: i32 = SvcOps::StuffText as i32;
pub const SVC_SERVERDATA: i32 = SvcOps::ServerData as i32;
pub const SVC_CONFIGSTRING: i32 = SvcOps::ConfigString as i32;
pub const SVC_SPAWNBASELINE: i32 = SvcOps::SpawnBaseline as i32;
pub const SVC_CENTERPRINT: i32 = SvcOps::CenterPrint as i32;
pub const SVC_PLAYERINFO: i32 = SvcOps::PlayerInfo as i32;
pub const SVC_PACKETENTITIES: i32 = SvcOps::PacketEntities as i32;
pub const SVC_DELTAPACKETENTITIES: i32 = SvcOps::DeltaPacketEntities as i32;
pub const SVC_FRAME: i32 = SvcOps::Frame as i32;

// ============================================================
// Player state communication flags
// ============================================================

bitflags::bitflags! {
    /// Which player state groups follow in svc_playerinfo.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PlayerStateFlags: u16 {
        const M_TYPE         = 1 << 0;
        const M_ORIGIN       = 1 << 1;
        const M_VELOCITY     = 1 << 2;
        const M_TIME         = 1 << 3;
        const M_FLAGS        = 1 << 4;
        const M_GRAVITY      = 1 << 5;
        const M_DELTA_ANGLES = 1 << 6;
        const VIEWOFFSET     = 1 << 7;
        const VIEWANGLES     = 1 << 8;
        const KICKANGLES     = 1 << 9;
        const BLEND          = 1 << 10;
        const FOV            = 1 << 11;
        const WEAPONINDEX    = 1 << 12;
        const WEAPONFRAME    = 1 << 13;
        const RDFLAGS        = 1 << 14;
    }
}
pub const PS_M_TYPE: PlayerStateFlags = PlayerStateFlags::M_TYPE;
pub const PS_M_ORIGIN: PlayerStateFlags = PlayerStateFlags::M_ORIGIN;
pub const PS_M_VELOCITY: PlayerStateFlags = PlayerStateFlags::M_VELOCITY;
pub const PS_M_TIME: PlayerStateFlags = PlayerStateFlags::M_TIME;
pub const PS_M_FLAGS: PlayerStateFlags = PlayerStateFlags::M_FLAGS;
pub const PS_M_GRAVITY: PlayerStateFlags = PlayerStateFlags::M_GRAVITY;
pub const PS_M_DELTA_ANGLES: PlayerStateFlags = PlayerStateFlags::M_DELTA_ANGLES;
pub const PS_VIEWOFFSET: PlayerStateFlags = PlayerStateFlags::VIEWOFFSET;
pub const PS_VIEWANGLES: PlayerStateFlags = PlayerStateFlags::VIEWANGLES;
pub const PS_KICKANGLES: PlayerStateFlags = PlayerStateFlags::KICKANGLES;
pub const PS_BLEND: PlayerStateFlags = PlayerStateFlags::BLEND;
pub const PS_FOV: PlayerStateFlags = PlayerStateFlags::FOV;
pub const PS_WEAPONINDEX: PlayerStateFlags = PlayerStateFlags::WEAPONINDEX;
pub const PS_WEAPONFRAME: PlayerStateFlags = PlayerStateFlags::WEAPONFRAME;
pub const PS_RDFLAGS: PlayerStateFlags = PlayerStateFlags::RDFLAGS;

// ============================================================
// Entity state communication flags
// ============================================================

bitflags::bitflags! {
    /// Change mask of one entity update. Bit 13 is unused.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EntityBits: u32 {
        // first byte
        const ORIGIN1    = 1 << 0;
        const ORIGIN2    = 1 << 1;
        const ANGLE2     = 1 << 2;
        const ANGLE3     = 1 << 3;
        const FRAME8     = 1 << 4; // frame is a byte
        const EVENT      = 1 << 5;
        const REMOVE     = 1 << 6; // REMOVE is only valid if not NUMBER16
        const MOREBITS1  = 1 << 7; // read one additional byte

        // second byte
        const NUMBER16   = 1 << 8; // NUMBER8 is implicit if not set
        const ORIGIN3    = 1 << 9;
        const ANGLE1     = 1 << 10;
        const MODEL      = 1 << 11;
        const RENDERFX8  = 1 << 12; // fullbright, etc
        const EFFECTS8   = 1 << 14; // autorotate, trails, etc
        const MOREBITS2  = 1 << 15; // read one additional byte

        // third byte
        const SKIN8      = 1 << 16;
        const FRAME16    = 1 << 17; // frame is a short
        const RENDERFX16 = 1 << 18; // 8 + 16 = 32
        const EFFECTS16  = 1 << 19; // 8 + 16 = 32
        const MODEL2     = 1 << 20; // weapons, flags, etc
        const MODEL3     = 1 << 21;
        const MODEL4     = 1 << 22;
        const MOREBITS3  = 1 << 23; // read one additional byte

        // fourth byte
        const OLDORIGIN  = 1 << 24; // FIXME: get rid of this
        const SKIN16     = 1 << 25;
        const SOUND      = 1 << 26;
        const SOLID      = 1 << 27;
    }
}
pub const U_ORIGIN1: EntityBits = EntityBits::ORIGIN1;
pub const U_ORIGIN2: EntityBits = EntityBits::ORIGIN2;
pub const U_ANGLE2: EntityBits = EntityBits::ANGLE2;
pub const U_ANGLE3: EntityBits = EntityBits::ANGLE3;
pub const U_FRAME8: EntityBits = EntityBits::FRAME8;
pub const U_EVENT: EntityBits = EntityBits::EVENT;
pub const U_REMOVE: EntityBits = EntityBits::REMOVE;
pub const U_MOREBITS1: EntityBits = EntityBits::MOREBITS1;
pub const U_NUMBER16: EntityBits = EntityBits::NUMBER16;
pub const U_ORIGIN3: EntityBits = EntityBits::ORIGIN3;
pub const U_ANGLE1: EntityBits = EntityBits::ANGLE1;
pub const U_MODEL: EntityBits = EntityBits::MODEL;
pub const U_RENDERFX8: EntityBits = EntityBits::RENDERFX8;
pub const U_EFFECTS8: EntityBits = EntityBits::EFFECTS8;
pub const U_MOREBITS2: EntityBits = EntityBits::MOREBITS2;
pub const U_SKIN8: EntityBits = EntityBits::SKIN8;
pub const U_FRAME16: EntityBits = EntityBits::FRAME16;
pub const U_RENDERFX16: EntityBits = EntityBits::RENDERFX16;
pub const U_EFFECTS16: EntityBits = EntityBits::EFFECTS16;
pub const U_MODEL2: EntityBits = EntityBits::MODEL2;
pub const U_MODEL3: EntityBits = EntityBits::MODEL3;
pub const U_MODEL4: EntityBits = EntityBits::MODEL4;
pub const U_MOREBITS3: EntityBits = EntityBits::MOREBITS3;
pub const U_OLDORIGIN: EntityBits = EntityBits::OLDORIGIN;
pub const U_SKIN16: EntityBits = EntityBits::SKIN16;
pub const U_SOUND: EntityBits = EntityBits::SOUND;
pub const U_SOLID: EntityBits = EntityBits::SOLID;

// ============================================================
// Net channel sequencing
// ============================================================

/// Sequencing state of the connection. Packet framing and reliable
/// retransmission happen below this layer; the client only needs to know
/// how far the server has acknowledged its commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetChan {
    /// Negotiated protocol version (34, 35, or 36)
    pub protocol: i32,

    pub incoming_sequence: i32,
    pub incoming_acknowledged: i32,
    pub outgoing_sequence: i32,
}

impl Default for NetChan {
    fn default() -> Self {
        Self {
            protocol: PROTOCOL_VERSION,
            incoming_sequence: 0,
            incoming_acknowledged: 0,
            // sequence 0 is reserved, the first command goes out as 1
            outgoing_sequence: 1,
        }
    }
}

impl NetChan {
    /// Record the sequence numbers carried in a received packet header.
    /// Stale or duplicated headers are ignored.
    pub fn process_header(&mut self, sequence: i32, acknowledged: i32) -> bool {
        if sequence <= self.incoming_sequence {
            return false;
        }
        self.incoming_sequence = sequence;
        if acknowledged > self.incoming_acknowledged {
            self.incoming_acknowledged = acknowledged;
        }
        true
    }
}
