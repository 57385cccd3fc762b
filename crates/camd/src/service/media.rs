// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Media service: fixed profiles, stream and snapshot URIs, video sources.

use super::handler::{ActionContext, ActionDefinition};
use super::ServiceEnv;
use crate::adapter::ProtocolResponse;
use crate::config::RTSP_PORT;
use crate::error::{Error, Result};
use crate::soap::XmlElement;

/// Port and path of the snapshot endpoint served by the platform.
pub const SNAPSHOT_PORT: u16 = 3000;
pub const SNAPSHOT_PATH: &str = "/snapshot.bmp";

const VIDEO_SOURCE_TOKEN: &str = "VideoSource0";
const AUDIO_SOURCE_TOKEN: &str = "AudioSource0";
const AUDIO_ENCODER_TOKEN: &str = "AudioEncoder0";
const PTZ_NODE_TOKEN: &str = "PTZNode0";
const FRAMERATE: u32 = 25;
const GOV_LENGTH: u32 = 50;
const URI_TIMEOUT: &str = "PT60S";

/// One streaming profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaProfile {
    pub token: &'static str,
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub encoder_token: &'static str,
    pub bitrate_kbps: u32,
    pub quality: f32,
    /// RTSP path of the stream.
    pub stream_path: &'static str,
}

pub const PROFILES: [MediaProfile; 2] = [
    MediaProfile {
        token: "MainProfile",
        name: "Main Video Profile",
        width: 1280,
        height: 720,
        encoder_token: "VideoEncoder0",
        bitrate_kbps: 2048,
        quality: 4.0,
        stream_path: "/vs0",
    },
    MediaProfile {
        token: "SubProfile",
        name: "Sub Video Profile",
        width: 640,
        height: 360,
        encoder_token: "VideoEncoder1",
        bitrate_kbps: 800,
        quality: 3.0,
        stream_path: "/vs1",
    },
];

/// Profile by token; NOT_FOUND otherwise.
pub fn find_profile(token: &str) -> Result<&'static MediaProfile> {
    PROFILES
        .iter()
        .find(|p| p.token == token)
        .ok_or_else(|| Error::not_found(format!("no profile with token '{}'", token)))
}

impl MediaProfile {
    fn to_xml(&self, element: &str) -> XmlElement {
        XmlElement::new(element)
            .attr("token", self.token)
            .attr("fixed", "true")
            .child(XmlElement::leaf("tt:Name", self.name))
            .child(
                XmlElement::new("tt:VideoSourceConfiguration")
                    .attr("token", "VideoSourceConfig0")
                    .child(XmlElement::leaf("tt:Name", "Video Source Configuration"))
                    .child(XmlElement::leaf("tt:UseCount", PROFILES.len()))
                    .child(XmlElement::leaf("tt:SourceToken", VIDEO_SOURCE_TOKEN))
                    .child(
                        XmlElement::new("tt:Bounds")
                            .attr("x", 0)
                            .attr("y", 0)
                            .attr("width", self.width)
                            .attr("height", self.height),
                    ),
            )
            .child(
                XmlElement::new("tt:AudioSourceConfiguration")
                    .attr("token", "AudioSourceConfig0")
                    .child(XmlElement::leaf("tt:SourceToken", AUDIO_SOURCE_TOKEN)),
            )
            .child(
                XmlElement::new("tt:VideoEncoderConfiguration")
                    .attr("token", self.encoder_token)
                    .child(XmlElement::leaf("tt:Encoding", "H264"))
                    .child(
                        XmlElement::new("tt:Resolution")
                            .child(XmlElement::leaf("tt:Width", self.width))
                            .child(XmlElement::leaf("tt:Height", self.height)),
                    )
                    .child(XmlElement::leaf("tt:Quality", self.quality))
                    .child(
                        XmlElement::new("tt:RateControl")
                            .child(XmlElement::leaf("tt:FrameRateLimit", FRAMERATE))
                            .child(XmlElement::leaf("tt:EncodingInterval", 1))
                            .child(XmlElement::leaf("tt:BitrateLimit", self.bitrate_kbps)),
                    )
                    .child(
                        XmlElement::new("tt:H264")
                            .child(XmlElement::leaf("tt:GovLength", GOV_LENGTH))
                            .child(XmlElement::leaf("tt:H264Profile", "Main")),
                    ),
            )
            .child(
                XmlElement::new("tt:AudioEncoderConfiguration")
                    .attr("token", AUDIO_ENCODER_TOKEN)
                    .child(XmlElement::leaf("tt:Encoding", "AAC"))
                    .child(XmlElement::leaf("tt:Bitrate", 64))
                    .child(XmlElement::leaf("tt:SampleRate", 16)),
            )
            .child(
                XmlElement::new("tt:PTZConfiguration")
                    .attr("token", "PTZConfig0")
                    .child(XmlElement::leaf("tt:NodeToken", PTZ_NODE_TOKEN)),
            )
    }
}

fn media_uri(element: &str, uri: String) -> XmlElement {
    XmlElement::new(element).child(
        XmlElement::new("trt:MediaUri")
            .child(XmlElement::leaf("tt:Uri", uri))
            .child(XmlElement::leaf("tt:InvalidAfterConnect", "false"))
            .child(XmlElement::leaf("tt:InvalidAfterReboot", "false"))
            .child(XmlElement::leaf("tt:Timeout", URI_TIMEOUT)),
    )
}

fn get_profiles(_ctx: &ActionContext<'_>, _resp: &mut ProtocolResponse) -> Result<Option<XmlElement>> {
    let mut resp = XmlElement::new("trt:GetProfilesResponse");
    for profile in &PROFILES {
        resp.push(profile.to_xml("trt:Profiles"));
    }
    Ok(Some(resp))
}

fn get_profile(ctx: &ActionContext<'_>, _resp: &mut ProtocolResponse) -> Result<Option<XmlElement>> {
    let profile = find_profile(ctx.params.require("ProfileToken")?)?;
    Ok(Some(
        XmlElement::new("trt:GetProfileResponse").child(profile.to_xml("trt:Profile")),
    ))
}

fn get_video_sources(
    _ctx: &ActionContext<'_>,
    _resp: &mut ProtocolResponse,
) -> Result<Option<XmlElement>> {
    let main = &PROFILES[0];
    Ok(Some(
        XmlElement::new("trt:GetVideoSourcesResponse").child(
            XmlElement::new("trt:VideoSources")
                .attr("token", VIDEO_SOURCE_TOKEN)
                .child(XmlElement::leaf("tt:Framerate", FRAMERATE))
                .child(
                    XmlElement::new("tt:Resolution")
                        .child(XmlElement::leaf("tt:Width", main.width))
                        .child(XmlElement::leaf("tt:Height", main.height)),
                ),
        ),
    ))
}

/// Stream types this device can serve.
fn check_stream_setup(ctx: &ActionContext<'_>) -> Result<()> {
    if let Some(stream) = ctx.params.param("Stream") {
        if stream != "RTP-Unicast" {
            return Err(Error::not_supported(format!(
                "stream type '{}' not supported",
                stream
            )));
        }
    }
    if let Some(protocol) = ctx.params.param("Protocol") {
        if !matches!(protocol, "RTSP" | "UDP" | "TCP") {
            return Err(Error::not_supported(format!(
                "transport protocol '{}' not supported",
                protocol
            )));
        }
    }
    Ok(())
}

/// Action table of the media service.
pub fn actions(env: ServiceEnv) -> Vec<ActionDefinition> {
    vec![
        ActionDefinition::from_fn("GetProfiles", get_profiles),
        ActionDefinition::from_fn("GetProfile", get_profile).require_params(&["ProfileToken"]),
        ActionDefinition::from_fn("GetStreamUri", move |ctx, _resp| {
            let profile = find_profile(ctx.params.require("ProfileToken")?)?;
            check_stream_setup(ctx)?;
            let uri = env.url("rtsp", RTSP_PORT, profile.stream_path);
            ctx.log.debug(&uri);
            Ok(Some(media_uri("trt:GetStreamUriResponse", uri)))
        })
        .require_params(&["ProfileToken"]),
        ActionDefinition::from_fn("GetSnapshotUri", move |ctx, _resp| {
            find_profile(ctx.params.require("ProfileToken")?)?;
            let uri = env.url("http", SNAPSHOT_PORT, SNAPSHOT_PATH);
            Ok(Some(media_uri("trt:GetSnapshotUriResponse", uri)))
        })
        .require_params(&["ProfileToken"]),
        ActionDefinition::from_fn("GetVideoSources", get_video_sources),
    ]
}
