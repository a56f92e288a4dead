use mavlink::common::VIDEO_STREAM_INFORMATION_DATA;
use serde::Serialize;

use crate::util::text_from_bytes;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoStream {
    pub stream_id: u8,
    pub name: String,
    pub uri: String,
    pub resolution_horizontal: u16,
    pub resolution_vertical: u16,
    pub framerate: f32,
}

impl From<&VIDEO_STREAM_INFORMATION_DATA> for VideoStream {
    fn from(info: &VIDEO_STREAM_INFORMATION_DATA) -> Self {
        Self {
            stream_id: info.stream_id,
            name: text_from_bytes(&info.name),
            uri: text_from_bytes(&info.uri),
            resolution_horizontal: info.resolution_h,
            resolution_vertical: info.resolution_v,
            framerate: info.framerate,
        }
    }
}

/// Camera component discovered on the link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Camera {
    pub system_id: u8,
    pub component_id: u8,
    /// Images captured during the active flight plan.
    pub image_count: u32,
    pub video_streams: Vec<VideoStream>,
}

impl Camera {
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
            image_count: 0,
            video_streams: Vec::new(),
        }
    }

    /// Inserts or replaces the stream with the same id.
    pub fn update_stream(&mut self, stream: VideoStream) {
        match self
            .video_streams
            .iter_mut()
            .find(|s| s.stream_id == stream.stream_id)
        {
            Some(existing) => *existing = stream,
            None => self.video_streams.push(stream),
        }
    }
}
