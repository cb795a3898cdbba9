// cl_parse.rs -- parse a message received from the server
//
// Copyright (C) 1997-2001 Id Software, Inc.
// Licensed under the GNU General Public License v2 or later.

use q2sync_common::common::*;
use q2sync_common::error::{ProtocolError, Result};
use q2sync_common::q_shared::*;
use q2sync_common::qcommon::*;

use crate::cl_ents::{cl_parse_delta, cl_parse_entity_bits, cl_parse_frame, ClientCallbacks, ClientEntState};
use crate::client::*;

// ============================================================
// Server command name strings (for debug display)
// ============================================================

pub static SVC_STRINGS: [&str; 21] = [
    "svc_bad",
    "svc_muzzleflash",
    "svc_muzzlflash2",
    "svc_temp_entity",
    "svc_layout",
    "svc_inventory",
    "svc_nop",
    "svc_disconnect",
    "svc_reconnect",
    "svc_sound",
    "svc_print",
    "svc_stufftext",
    "svc_serverdata",
    "svc_configstring",
    "svc_spawnbaseline",
    "svc_centerprint",
    "svc_download",
    "svc_playerinfo",
    "svc_packetentities",
    "svc_deltapacketentities",
    "svc_frame",
];

pub fn svc_string(cmd: i32) -> &'static str {
    usize::try_from(cmd)
        .ok()
        .and_then(|i| SVC_STRINGS.get(i).copied())
        .unwrap_or("???")
}

/// Log a command byte that was just read, at cl_shownet 2 and above.
pub fn cl_shownet(net_message: &SizeBuf, cl_shownet_value: i32, cmd: i32) {
    if cl_shownet_value >= 2 {
        tracing::debug!("{:3}:{}", net_message.readcount - 1, svc_string(cmd));
    }
}

// ============================================================
// Level setup
// ============================================================

/// CL_ParseServerData -- the server is starting a new level.
pub fn cl_parse_server_data(
    cl: &mut ClientState,
    cls: &mut ClientStatic,
    ent_state: &mut ClientEntState,
    net_message: &mut SizeBuf,
) -> Result<()> {
    tracing::debug!("Serverdata packet received.");

    // wipe the client_state_t struct
    *cl = ClientState::default();
    ent_state.clear();
    cls.state = ConnState::Connected;

    // parse protocol version number
    let version = msg_read_long(net_message)?;
    if !is_supported_protocol(version) {
        return Err(ProtocolError::UnsupportedProtocol {
            version,
            min: MIN_SUPPORTED_PROTOCOL,
            max: MAX_SUPPORTED_PROTOCOL,
        });
    }
    cls.server_protocol = version;
    cls.netchan.protocol = version;

    if version >= PROTOCOL_R1Q2 {
        let proto_name = if version == PROTOCOL_Q2PRO { "Q2Pro" } else { "R1Q2" };
        tracing::debug!("Using {} protocol ({})", proto_name, version);
    }

    cl.servercount = msg_read_long(net_message)?;
    cl.attractloop = msg_read_byte(net_message)? != 0;

    // game directory
    cl.gamedir = msg_read_string(net_message)?;

    // parse player entity number
    cl.playernum = msg_read_short(net_message)?;

    // get the full level name
    cl.levelname = msg_read_string(net_message)?;
    tracing::info!(map = %cl.levelname, servercount = cl.servercount, "entering level");

    cl.frame_state = FrameState::AwaitingKeyframe;
    Ok(())
}

/// CL_ParseBaseline -- baselines are deltas from the null state.
pub fn cl_parse_baseline(
    cl: &mut ClientState,
    ent_state: &mut ClientEntState,
    net_message: &mut SizeBuf,
) -> Result<()> {
    let nullstate = EntityState::default();

    let (newnum, bits) = cl_parse_entity_bits(net_message, &mut cl.bitcounts)?;
    let baseline = cl_parse_delta(&nullstate, newnum, bits, net_message)?;
    ent_state.cl_entities[newnum as usize].baseline = baseline;
    Ok(())
}

pub fn cl_parse_config_string(
    cl: &mut ClientState,
    net_message: &mut SizeBuf,
    callbacks: &mut dyn ClientCallbacks,
) -> Result<()> {
    let i = msg_read_short(net_message)?;
    if i < 0 || i as usize >= MAX_CONFIGSTRINGS {
        return Err(ProtocolError::BadConfigString(i));
    }
    let s = msg_read_string(net_message)?;
    callbacks.configstring_changed(i as usize, &s);
    cl.configstrings[i as usize] = s;
    Ok(())
}

// ============================================================
// CL_ParseServerMessage
// ============================================================

pub fn cl_parse_server_message(
    cl: &mut ClientState,
    cls: &mut ClientStatic,
    ent_state: &mut ClientEntState,
    net_message: &mut SizeBuf,
    cvars: &ClientCvars,
    callbacks: &mut dyn ClientCallbacks,
) -> Result<()> {
    if cvars.cl_shownet == 1 {
        tracing::debug!("{} ", net_message.cursize);
    } else if cvars.cl_shownet >= 2 {
        tracing::debug!("------------------");
    }

    //
    // parse the message
    //
    loop {
        if net_message.readcount >= net_message.cursize {
            if cvars.cl_shownet >= 2 {
                tracing::debug!("{:3}:END OF MESSAGE", net_message.readcount - 1);
            }
            break;
        }

        let cmd = msg_read_byte(net_message)?;
        if cvars.cl_shownet >= 2 {
            if SvcOps::from_i32(cmd).is_none() {
                tracing::debug!("{:3}:BAD CMD {}", net_message.readcount - 1, cmd);
            } else {
                cl_shownet(net_message, cvars.cl_shownet, cmd);
            }
        }

        // other commands
        match SvcOps::from_i32(cmd) {
            Some(SvcOps::Nop) => {}

            Some(SvcOps::Disconnect) => return Err(ProtocolError::ServerDisconnected),

            Some(SvcOps::Print) => {
                let level = msg_read_byte(net_message)?;
                let s = msg_read_string(net_message)?;
                callbacks.print(level, &s);
            }

            Some(SvcOps::CenterPrint) => {
                let s = msg_read_string(net_message)?;
                callbacks.centerprint(&s);
            }

            Some(SvcOps::StuffText) => {
                let s = msg_read_string(net_message)?;
                tracing::debug!("stufftext: {}", s);
                callbacks.stufftext(&s);
            }

            Some(SvcOps::ServerData) => cl_parse_server_data(cl, cls, ent_state, net_message)?,

            Some(SvcOps::ConfigString) => cl_parse_config_string(cl, net_message, callbacks)?,

            Some(SvcOps::SpawnBaseline) => cl_parse_baseline(cl, ent_state, net_message)?,

            Some(SvcOps::Layout) => {
                cl.layout = msg_read_string(net_message)?;
            }

            Some(SvcOps::Frame) => cl_parse_frame(cl, cls, ent_state, net_message, cvars, callbacks)?,

            Some(SvcOps::PlayerInfo | SvcOps::PacketEntities | SvcOps::DeltaPacketEntities) => {
                return Err(ProtocolError::OutOfPlaceFrameData(cmd));
            }

            _ => return Err(ProtocolError::IllegibleMessage(cmd)),
        }
    }

    Ok(())
}
