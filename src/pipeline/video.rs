//! Video renderers: RGB gradient, cloud scroll, scrolling text and the
//! image slideshow.
//!
//! Every renderer produces packed `bgr24` frames and hands them to a
//! [`FrameSink`]; none of them knows how the intermediate is stored.

use crate::error::Pdf2MediaError;
use crate::pipeline::encode::{FrameSink, VideoFormat};
use crate::pipeline::envelope::{CloudStrip, TextChunks, CLOUD_PANEL, RGB_FRAMES, VIDEO_FPS};
use crate::pipeline::glyph::TextPainter;
use crate::pipeline::input;
use crate::pipeline::RenderContext;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::{debug, info};

pub const RGB_FORMAT: VideoFormat = VideoFormat {
    width: 520,
    height: 520,
    fps: VIDEO_FPS,
};

pub const CLOUD_FORMAT: VideoFormat = VideoFormat {
    width: CLOUD_PANEL.0,
    height: CLOUD_PANEL.1,
    fps: VIDEO_FPS,
};

pub const TEXT_FORMAT: VideoFormat = VideoFormat {
    width: 600,
    height: 225,
    fps: 30,
};

pub const SLIDESHOW_FORMAT: VideoFormat = VideoFormat {
    width: 1280,
    height: 720,
    fps: VIDEO_FPS,
};

/// Seconds each slideshow image stays on screen.
pub const SLIDE_SECS: u32 = 4;
pub const SLIDE_FRAMES: usize = (SLIDE_SECS * VIDEO_FPS) as usize;

/// Pixels the text moves left per frame.
pub const TEXT_SPEED: u32 = 5;

/// Font size for the text video: 60 % of the frame height.
pub fn text_font_size() -> f32 {
    (TEXT_FORMAT.height as f32 * 0.6).floor()
}

/// Frames between progress reports.
const FRAME_STRIDE: usize = 25;

// ── RGB ──────────────────────────────────────────────────────────────────

/// One solid frame per gradient entry.
pub fn render_rgb(gradient: &[[u8; 3]], sink: &mut dyn FrameSink, ctx: &RenderContext<'_>) -> Result<(), Pdf2MediaError> {
    let mut frame = vec![0u8; RGB_FORMAT.frame_len()];
    let mut painted: Option<[u8; 3]> = None;
    for (i, &color) in gradient.iter().enumerate() {
        if i % FRAME_STRIDE == 0 {
            ctx.step(i, gradient.len())?;
        }
        // Neighbouring frames usually share a colour.
        if painted != Some(color) {
            let [r, g, b] = color;
            for px in frame.chunks_exact_mut(3) {
                px.copy_from_slice(&[b, g, r]);
            }
            painted = Some(color);
        }
        sink.write_frame(&frame)?;
    }
    ctx.step(gradient.len(), gradient.len())?;
    info!("RGB render: {} frames", gradient.len());
    Ok(())
}

// ── Clouds ───────────────────────────────────────────────────────────────

/// Pixels per frame so that `strip_width - frame_width` crosses in 12 minutes.
pub fn cloud_speed(strip_width: u32) -> f64 {
    strip_width.saturating_sub(CLOUD_FORMAT.width) as f64 / RGB_FRAMES as f64
}

/// Left edge of the crop window for `frame`.
pub fn cloud_offset(frame: usize, speed: f64) -> u32 {
    (frame as f64 * speed) as u32
}

/// Copy an RGB image into a packed BGR buffer.
fn rgb_to_bgr(img: &RgbImage, out: &mut [u8]) {
    for (dst, src) in out.chunks_exact_mut(3).zip(img.pixels()) {
        dst.copy_from_slice(&[src[2], src[1], src[0]]);
    }
}

/// Crop the window starting at `x` into `out` as BGR.
///
/// A crop running past the end of the strip is stretched back to full size.
pub fn cloud_frame(strip: &CloudStrip, x: u32, out: &mut [u8]) {
    let (fw, fh) = (CLOUD_FORMAT.width, CLOUD_FORMAT.height);
    let x = x.min(strip.width().saturating_sub(1));
    let w = fw.min(strip.width() - x);
    let crop = imageops::crop_imm(&strip.image, x, 0, w, fh).to_image();
    if w == fw {
        rgb_to_bgr(&crop, out);
    } else {
        let resized = imageops::resize(&crop, fw, fh, FilterType::Triangle);
        rgb_to_bgr(&resized, out);
    }
}

/// Scroll a 750×360 window across the strip for exactly [`RGB_FRAMES`] frames.
pub fn render_clouds(strip: &CloudStrip, sink: &mut dyn FrameSink, ctx: &RenderContext<'_>) -> Result<(), Pdf2MediaError> {
    let speed = cloud_speed(strip.width());
    debug!("Cloud scroll: {:.4} px/frame over {} px", speed, strip.width());

    let mut frame = vec![0u8; CLOUD_FORMAT.frame_len()];
    for i in 0..RGB_FRAMES {
        if i % FRAME_STRIDE == 0 {
            ctx.step(i, RGB_FRAMES)?;
        }
        cloud_frame(strip, cloud_offset(i, speed), &mut frame);
        sink.write_frame(&frame)?;
    }
    ctx.step(RGB_FRAMES, RGB_FRAMES)?;
    info!("Cloud render: {} frames", RGB_FRAMES);
    Ok(())
}

// ── Slideshow ────────────────────────────────────────────────────────────

/// Fit `img` inside the slideshow frame, centred on black, as BGR.
pub fn slide_frame(img: &DynamicImage, out: &mut [u8]) {
    let (fw, fh) = (SLIDESHOW_FORMAT.width, SLIDESHOW_FORMAT.height);
    let fitted = img.resize(fw, fh, FilterType::Triangle).to_rgb8();
    let mut canvas = RgbImage::new(fw, fh);
    let x = (fw.saturating_sub(fitted.width()) / 2) as i64;
    let y = (fh.saturating_sub(fitted.height()) / 2) as i64;
    imageops::replace(&mut canvas, &fitted, x, y);
    rgb_to_bgr(&canvas, out);
}

/// Show every image for [`SLIDE_FRAMES`] frames, in order.
///
/// Images are decoded one at a time.
pub fn render_slideshow(images: &[PathBuf], sink: &mut dyn FrameSink, ctx: &RenderContext<'_>) -> Result<(), Pdf2MediaError> {
    let total = images.len() * SLIDE_FRAMES;
    let mut frame = vec![0u8; SLIDESHOW_FORMAT.frame_len()];
    let mut written = 0usize;
    for path in images {
        let img = input::open_image(path)?;
        debug!("Slide {}: {}x{}", path.display(), img.width(), img.height());
        slide_frame(&img, &mut frame);
        for _ in 0..SLIDE_FRAMES {
            if written % FRAME_STRIDE == 0 {
                ctx.step(written, total)?;
            }
            sink.write_frame(&frame)?;
            written += 1;
        }
    }
    ctx.step(total, total)?;
    info!("Slideshow render: {} images, {} frames", images.len(), total);
    Ok(())
}

// ── Text ─────────────────────────────────────────────────────────────────

/// `floor(W/s) + floor(frame_width/s) + 5`.
pub fn text_frame_count(total_width: u64, frame_width: u32, speed: u32) -> usize {
    let speed = u64::from(speed.max(1));
    (total_width / speed + u64::from(frame_width) / speed + 5) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveChunk {
    index: usize,
    pos: i64,
}

/// The sliding window of chunks currently on (or about to enter) screen.
///
/// Positions live in scroll space; a chunk is drawn at `pos - scroll`.
#[derive(Debug)]
pub struct TextScroller {
    widths: Vec<u32>,
    next: usize,
    active: VecDeque<ActiveChunk>,
    scroll: i64,
    frame_width: i64,
    speed: i64,
}

impl TextScroller {
    pub fn new(widths: Vec<u32>, frame_width: u32, speed: u32) -> Self {
        let frame_width = i64::from(frame_width);
        let mut s = Self {
            widths,
            next: 0,
            active: VecDeque::new(),
            scroll: frame_width,
            frame_width,
            speed: i64::from(speed),
        };
        while s.next < s.widths.len() && s.active.back().is_none_or(|last| s.trailing_edge(last) < s.frame_width) {
            s.push_next();
        }
        s
    }

    fn trailing_edge(&self, chunk: &ActiveChunk) -> i64 {
        chunk.pos + i64::from(self.widths[chunk.index])
    }

    fn push_next(&mut self) {
        let pos = match self.active.back() {
            Some(last) => self.trailing_edge(last),
            None => self.scroll + self.frame_width,
        };
        self.active.push_back(ActiveChunk { index: self.next, pos });
        self.next += 1;
    }

    /// Chunks to draw this frame as `(chunk index, x)`, then scroll on.
    pub fn advance(&mut self) -> Vec<(usize, i64)> {
        while let Some(first) = self.active.front() {
            if self.trailing_edge(first) < self.scroll {
                self.active.pop_front();
            } else {
                break;
            }
        }
        while self.next < self.widths.len()
            && self
                .active
                .back()
                .is_none_or(|last| self.trailing_edge(last) <= self.scroll + self.frame_width)
        {
            self.push_next();
        }

        let visible = self
            .active
            .iter()
            .map(|c| (c.index, c.pos - self.scroll))
            .collect();
        self.scroll += self.speed;
        visible
    }
}

/// Scroll the chunks right to left in `color`.
pub fn render_text(
    chunks: &TextChunks,
    painter: &mut dyn TextPainter,
    color: [u8; 3],
    sink: &mut dyn FrameSink,
    ctx: &RenderContext<'_>,
) -> Result<(), Pdf2MediaError> {
    let widths: Vec<u32> = chunks.chunks.iter().map(|c| painter.text_width(c)).collect();
    let total_width: u64 = widths.iter().map(|&w| u64::from(w)).sum();
    let frames = text_frame_count(total_width, TEXT_FORMAT.width, TEXT_SPEED);
    let y = (TEXT_FORMAT.height / 2) as i32 - (painter.cap_height() / 2) as i32;
    let bgr = [color[2], color[1], color[0]];
    debug!("Text scroll: {} chunks, {} px, {} frames", chunks.chunks.len(), total_width, frames);

    let mut scroller = TextScroller::new(widths, TEXT_FORMAT.width, TEXT_SPEED);
    let mut frame = vec![0u8; TEXT_FORMAT.frame_len()];
    for i in 0..frames {
        if i % FRAME_STRIDE == 0 {
            ctx.step(i, frames)?;
        }
        frame.fill(0);
        for (index, x) in scroller.advance() {
            if x >= i64::from(TEXT_FORMAT.width) {
                continue;
            }
            painter.draw(
                &mut frame,
                TEXT_FORMAT.width,
                TEXT_FORMAT.height,
                x as i32,
                y,
                &chunks.chunks[index],
                bgr,
            );
        }
        sink.write_frame(&frame)?;
    }
    ctx.step(frames, frames)?;
    info!("Text render: {} frames", frames);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::CancelToken;
    use image::Rgb;

    #[derive(Default)]
    struct CountingSink {
        frames: usize,
        first: Option<Vec<u8>>,
        last: Option<Vec<u8>>,
    }

    impl FrameSink for CountingSink {
        fn write_frame(&mut self, frame: &[u8]) -> Result<(), Pdf2MediaError> {
            if self.first.is_none() {
                self.first = Some(frame.to_vec());
            }
            self.last = Some(frame.to_vec());
            self.frames += 1;
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<(), Pdf2MediaError> {
            Ok(())
        }
    }

    /// Every character is 10 px wide and paints a 1-px mark at its origin.
    struct MonoPainter;

    impl TextPainter for MonoPainter {
        fn text_width(&mut self, text: &str) -> u32 {
            text.chars().count() as u32 * 10
        }

        fn cap_height(&mut self) -> u32 {
            20
        }

        fn draw(&mut self, frame: &mut [u8], width: u32, height: u32, x: i32, y: i32, text: &str, color: [u8; 3]) {
            for (i, _) in text.chars().enumerate() {
                let px = x + i as i32 * 10;
                if px >= 0 && px < width as i32 && y >= 0 && y < height as i32 {
                    let idx = ((y as u32 * width + px as u32) * 3) as usize;
                    frame[idx..idx + 3].copy_from_slice(&color);
                }
            }
        }
    }

    #[test]
    fn frame_count_formula() {
        assert_eq!(text_frame_count(1000, 600, 5), 200 + 120 + 5);
        assert_eq!(text_frame_count(7, 600, 5), 1 + 120 + 5);
        assert_eq!(text_frame_count(0, 600, 5), 125);
    }

    #[test]
    fn scroller_starts_off_screen_right() {
        let mut s = TextScroller::new(vec![50, 50, 50], 600, 5);
        let first = s.advance();
        assert_eq!(first, vec![(0, 600)]);
        let second = s.advance();
        assert_eq!(second, vec![(0, 595)]);
    }

    #[test]
    fn scroller_appends_adjacent_and_evicts_left() {
        let mut s = TextScroller::new(vec![50, 50], 600, 5);
        // Chunk 1 enters once chunk 0's trailing edge (1250) is within 1200 + scroll delta.
        let mut saw_both = false;
        for _ in 0..400 {
            let v = s.advance();
            if v.len() == 2 {
                assert_eq!(v[1].1 - v[0].1, 50);
                saw_both = true;
            }
            for (_, x) in &v {
                // Evicted before the trailing edge is more than one step past the left edge.
                assert!(*x + 50 >= -5);
            }
        }
        assert!(saw_both);
        assert!(s.advance().is_empty());
    }

    #[test]
    fn text_render_writes_exact_frame_count() {
        let chunks = TextChunks {
            chunks: vec!["hello".into(), "world".into()],
        };
        let cancel = CancelToken::new();
        let ctx = RenderContext::new("t", &cancel, None);
        let mut sink = CountingSink::default();
        render_text(&chunks, &mut MonoPainter, [255, 0, 0], &mut sink, &ctx).unwrap();
        assert_eq!(sink.frames, text_frame_count(100, 600, 5));
        // Last frame: everything has scrolled off.
        assert!(sink.last.unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn rgb_frames_are_bgr() {
        let cancel = CancelToken::new();
        let ctx = RenderContext::new("t", &cancel, None);
        let mut sink = CountingSink::default();
        render_rgb(&[[10, 20, 30], [40, 50, 60]], &mut sink, &ctx).unwrap();
        assert_eq!(sink.frames, 2);
        assert_eq!(&sink.first.unwrap()[..6], &[30, 20, 10, 30, 20, 10]);
    }

    #[test]
    fn cloud_speed_crosses_strip_minus_one_frame() {
        let speed = cloud_speed(750 * 3);
        assert!((speed - 1500.0 / 18000.0).abs() < 1e-12);
        assert_eq!(cloud_offset(RGB_FRAMES - 1, speed), 1499);
        assert_eq!(cloud_speed(750), 0.0);
    }

    #[test]
    fn cloud_frames_track_the_strip() {
        let mut image = RgbImage::from_pixel(1500, 360, Rgb([0, 0, 255]));
        for y in 0..360 {
            for x in 0..750 {
                image.put_pixel(x, y, Rgb([255, 0, 0]));
            }
        }
        let strip = CloudStrip { image };
        let speed = cloud_speed(strip.width());
        let mut frame = vec![0u8; CLOUD_FORMAT.frame_len()];

        // Starts on the red page.
        cloud_frame(&strip, cloud_offset(0, speed), &mut frame);
        assert_eq!(&frame[..3], &[0, 0, 255]);

        // Ends with the window one pixel short of the blue page's edge.
        let x = cloud_offset(RGB_FRAMES - 1, speed);
        assert_eq!(x, 749);
        cloud_frame(&strip, x, &mut frame);
        assert_eq!(&frame[..3], &[0, 0, 255]);
        assert_eq!(&frame[frame.len() - 3..], &[255, 0, 0]);
    }

    #[test]
    fn cloud_crop_past_the_end_is_stretched() {
        let strip = CloudStrip {
            image: RgbImage::from_pixel(800, 360, Rgb([9, 9, 9])),
        };
        let mut frame = vec![0u8; CLOUD_FORMAT.frame_len()];
        cloud_frame(&strip, 700, &mut frame);
        assert!(frame.iter().all(|&b| b == 9));
    }

    #[test]
    fn slides_are_letterboxed_and_centred() {
        // 2:1 image in a 16:9 frame: full width, black bars above and below.
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([10, 20, 30])));
        let mut frame = vec![0u8; SLIDESHOW_FORMAT.frame_len()];
        slide_frame(&img, &mut frame);

        let (w, h) = (SLIDESHOW_FORMAT.width as usize, SLIDESHOW_FORMAT.height as usize);
        let at = |x: usize, y: usize| &frame[(y * w + x) * 3..(y * w + x) * 3 + 3];
        assert_eq!(at(0, 0), &[0, 0, 0]);
        assert_eq!(at(w / 2, 0), &[0, 0, 0]);
        assert_eq!(at(w / 2, h / 2), &[30, 20, 10]);
        assert_eq!(at(0, h / 2), &[30, 20, 10]);
        assert_eq!(at(w - 1, h / 2), &[30, 20, 10]);
        assert_eq!(at(w / 2, h - 1), &[0, 0, 0]);
    }

    #[test]
    fn slideshow_holds_each_image_four_seconds() {
        let tmp = tempfile::tempdir().unwrap();
        let red = tmp.path().join("a.png");
        let blue = tmp.path().join("b.png");
        RgbImage::from_pixel(16, 9, Rgb([255, 0, 0])).save(&red).unwrap();
        RgbImage::from_pixel(16, 9, Rgb([0, 0, 255])).save(&blue).unwrap();

        let cancel = CancelToken::new();
        let ctx = RenderContext::new("t", &cancel, None);
        let mut sink = CountingSink::default();
        render_slideshow(&[red, blue], &mut sink, &ctx).unwrap();
        assert_eq!(SLIDE_FRAMES, 100);
        assert_eq!(sink.frames, 200);
        assert_eq!(&sink.first.unwrap()[..3], &[0, 0, 255]);
        assert_eq!(&sink.last.unwrap()[..3], &[255, 0, 0]);
    }

    #[test]
    fn slideshow_fails_on_undecodable_image() {
        let tmp = tempfile::tempdir().unwrap();
        let bad = tmp.path().join("bad.jpg");
        std::fs::write(&bad, b"nope").unwrap();
        let cancel = CancelToken::new();
        let ctx = RenderContext::new("t", &cancel, None);
        let mut sink = CountingSink::default();
        let err = render_slideshow(&[bad], &mut sink, &ctx).unwrap_err();
        assert!(matches!(err, Pdf2MediaError::ImageDecodeFailed { .. }));
        assert_eq!(sink.frames, 0);
    }

    #[test]
    fn cancelled_render_stops() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = RenderContext::new("t", &cancel, None);
        let mut sink = CountingSink::default();
        let err = render_rgb(&[[0, 0, 0]; 10], &mut sink, &ctx).unwrap_err();
        assert!(matches!(err, Pdf2MediaError::Cancelled));
        assert_eq!(sink.frames, 0);
    }
}
