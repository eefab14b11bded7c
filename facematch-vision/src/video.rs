use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::Path;

/// Sequential source of decoded RGB frames.
///
/// `Ok(None)` is a clean end of stream; `Err` is a decode failure. Sources
/// release their underlying handle on drop.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        (**self).read_frame()
    }
}

/// Video file decoded with libavformat/libavcodec, converted to RGB24.
pub struct VideoFile {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    flushing: bool,
}

impl VideoFile {
    pub fn open(path: &Path) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;

        let input = ffmpeg::format::input(path)
            .with_context(|| format!("open {}", path.display()))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .with_context(|| format!("no video stream in {}", path.display()))?;
        let stream_index = stream.index();
        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("codec parameters")?
            .decoder()
            .video()
            .context("open video decoder")?;

        let (width, height) = (decoder.width(), decoder.height());
        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .context("create RGB converter")?;

        log::debug!(
            "opened {}: {}x{} codec={:?} frames~{}",
            path.display(),
            width,
            height,
            decoder.codec().map(|c| c.name().to_string()),
            stream.frames()
        );

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            width,
            height,
            flushing: false,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn receive(&mut self) -> Result<Option<RgbImage>> {
        let mut decoded = ffmpeg::util::frame::video::Video::empty();
        match self.decoder.receive_frame(&mut decoded) {
            Ok(()) => {}
            Err(e) if frame_pending(&e) => return Ok(None),
            Err(e) => return Err(e).context("decode frame"),
        }
        let mut rgb = ffmpeg::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb)
            .context("convert frame to RGB")?;

        let pixels = packed_rgb(rgb.data(0), rgb.stride(0), self.width, self.height);
        RgbImage::from_raw(self.width, self.height, pixels)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("failed to build image buffer"))
    }
}

impl FrameSource for VideoFile {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        loop {
            if let Some(frame) = self.receive()? {
                return Ok(Some(frame));
            }
            if self.flushing {
                return Ok(None);
            }

            match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    // A corrupt packet is dropped; the decoder resyncs on the next keyframe.
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        log::warn!("decoder rejected packet: {}", e);
                    }
                }
                None => {
                    self.decoder.send_eof().context("flush decoder")?;
                    self.flushing = true;
                }
            }
        }
    }
}

/// Whether a `receive_frame` error only means the decoder needs more input
/// or has been fully drained.
fn frame_pending(err: &ffmpeg::Error) -> bool {
    match err {
        ffmpeg::Error::Eof => true,
        ffmpeg::Error::Other { errno } => *errno == ffmpeg::error::EAGAIN,
        _ => false,
    }
}

/// Strips per-row padding so rows are exactly `width * 3` bytes.
fn packed_rgb(data: &[u8], stride: usize, width: u32, height: u32) -> Vec<u8> {
    let row = width as usize * 3;
    let mut out = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        out.extend_from_slice(&data[start..start + row]);
    }
    out
}
