use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use fast_image_resize::{self as fir, images::Image as FirImage};
use image::{DynamicImage, RgbImage};

use super::{Delivery, ImageRequest};
use crate::error::{Error, Result};

/// Decode an image file to RGB with EXIF orientation applied, scaled to cover the
/// requested box.
///
/// - JPEG: `turbojpeg` full-resolution RGB decode (feature-gated)
/// - Other formats, or when turbojpeg fails: `image` crate decode
///
/// Images already smaller than the box are returned at their native size.
pub fn load_for_request(path: &Path, request: &ImageRequest) -> Result<DynamicImage> {
    let (rgb, w, h) = decode_rgb(path)?;
    let orientation = read_exif_orientation(path);
    let (rgb, w, h) = apply_orientation_rgb(&rgb, w, h, orientation);

    let (tw, th) = cover_size(w as u32, h as u32, request.width, request.height);
    let rgb = if (tw, th) == (w as u32, h as u32) {
        rgb
    } else {
        resize_rgb(rgb, w as u32, h as u32, tw, th, request.delivery)?
    };

    RgbImage::from_raw(tw, th, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| Error::ImageUnavailable {
            id: path.display().to_string(),
            reason: "decoded buffer size mismatch".to_string(),
        })
}

fn decode_rgb(path: &Path) -> Result<(Vec<u8>, usize, usize)> {
    #[cfg(feature = "turbojpeg")]
    if is_jpeg(path) {
        if let Some(decoded) = decode_jpeg_rgb(path) {
            return Ok(decoded);
        }
    }

    let img = image::open(path)?;
    let rgb = img.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    Ok((rgb.into_raw(), w, h))
}

#[cfg(feature = "turbojpeg")]
fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
}

#[cfg(feature = "turbojpeg")]
fn decode_jpeg_rgb(path: &Path) -> Option<(Vec<u8>, usize, usize)> {
    let jpeg_data = std::fs::read(path).ok()?;
    let mut decompressor = turbojpeg::Decompressor::new().ok()?;
    let header = decompressor.read_header(&jpeg_data).ok()?;
    let (w, h) = (header.width, header.height);

    let mut buf = vec![0u8; w * h * 3];
    let output = turbojpeg::Image {
        pixels: buf.as_mut_slice(),
        width: w,
        pitch: w * 3,
        height: h,
        format: turbojpeg::PixelFormat::RGB,
    };
    decompressor.decompress(&jpeg_data, output).ok()?;
    Some((buf, w, h))
}

/// Smallest size keeping the aspect ratio that covers `box_w` x `box_h`,
/// never larger than the source.
pub fn cover_size(w: u32, h: u32, box_w: u32, box_h: u32) -> (u32, u32) {
    if w == 0 || h == 0 || box_w == 0 || box_h == 0 {
        return (w, h);
    }
    let scale = (box_w as f64 / w as f64).max(box_h as f64 / h as f64);
    if scale >= 1.0 {
        return (w, h);
    }
    let tw = ((w as f64 * scale).round() as u32).clamp(1, w);
    let th = ((h as f64 * scale).round() as u32).clamp(1, h);
    (tw, th)
}

fn resize_rgb(buf: Vec<u8>, w: u32, h: u32, tw: u32, th: u32, delivery: Delivery) -> Result<Vec<u8>> {
    let src = FirImage::from_vec_u8(w, h, buf, fir::PixelType::U8x3).map_err(|e| {
        Error::ImageUnavailable {
            id: String::new(),
            reason: e.to_string(),
        }
    })?;
    let mut dst = FirImage::new(tw, th, fir::PixelType::U8x3);
    let options = match delivery {
        Delivery::HighQuality => fir::ResizeOptions::new(),
        Delivery::Fast => fir::ResizeOptions::new().resize_alg(fir::ResizeAlg::Nearest),
    };
    fir::Resizer::new()
        .resize(&src, &mut dst, &options)
        .map_err(|e| Error::ImageUnavailable {
            id: String::new(),
            reason: e.to_string(),
        })?;
    Ok(dst.into_vec())
}

fn read_exif(path: &Path) -> Option<exif::Exif> {
    let file = std::fs::File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    exif::Reader::new().read_from_container(&mut reader).ok()
}

/// Read EXIF orientation tag (1-8). Returns 1 (normal) if missing or unreadable.
pub fn read_exif_orientation(path: &Path) -> u8 {
    read_exif(path)
        .and_then(|exif| {
            exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        })
        .map(|v| v as u8)
        .unwrap_or(1)
}

/// Capture time from EXIF `DateTimeOriginal`, honouring `OffsetTimeOriginal` when
/// present and the local zone otherwise.
pub fn read_capture_date(path: &Path) -> Option<DateTime<FixedOffset>> {
    let exif = read_exif(path)?;
    let raw = ascii_field(&exif, exif::Tag::DateTimeOriginal)
        .or_else(|| ascii_field(&exif, exif::Tag::DateTime))?;
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S").ok()?;

    match ascii_field(&exif, exif::Tag::OffsetTimeOriginal).and_then(|s| parse_offset(&s)) {
        Some(offset) => offset.from_local_datetime(&naive).single(),
        None => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|d| d.fixed_offset()),
    }
}

fn ascii_field(exif: &exif::Exif, tag: exif::Tag) -> Option<String> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    match field.value {
        exif::Value::Ascii(ref values) => values
            .first()
            .and_then(|v| std::str::from_utf8(v).ok())
            .map(|s| s.trim_end_matches('\0').to_string()),
        _ => None,
    }
}

/// Parse an EXIF offset string such as `+09:00` or `-05:30`.
pub fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Apply EXIF orientation to an RGB buffer, returning corrected buffer and new dimensions.
///
/// 1: Normal                    5: Mirror + rotate 90° CW
/// 2: Mirror horizontal         6: Rotate 90° CW
/// 3: Rotate 180°               7: Mirror + rotate 90° CCW
/// 4: Mirror vertical           8: Rotate 90° CCW
pub fn apply_orientation_rgb(buf: &[u8], w: usize, h: usize, orientation: u8) -> (Vec<u8>, usize, usize) {
    if !(2..=8).contains(&orientation) {
        return (buf.to_vec(), w, h);
    }

    let mut out = vec![0u8; w * h * 3];
    let (new_w, new_h) = if orientation >= 5 { (h, w) } else { (w, h) };

    for y in 0..h {
        for x in 0..w {
            let src_idx = (y * w + x) * 3;
            let (dx, dy) = match orientation {
                2 => (w - 1 - x, y),
                3 => (w - 1 - x, h - 1 - y),
                4 => (x, h - 1 - y),
                5 => (y, x),
                6 => (h - 1 - y, x),
                7 => (h - 1 - y, w - 1 - x),
                _ => (y, w - 1 - x),
            };
            let dst_idx = (dy * new_w + dx) * 3;
            out[dst_idx..dst_idx + 3].copy_from_slice(&buf[src_idx..src_idx + 3]);
        }
    }
    (out, new_w, new_h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn px(v: u8) -> [u8; 3] {
        [v, v, v]
    }

    fn grid(values: &[u8]) -> Vec<u8> {
        values.iter().flat_map(|v| px(*v)).collect()
    }

    #[test]
    fn test_orientation_identity() {
        let buf = grid(&[1, 2, 3, 4, 5, 6]);
        let (out, w, h) = apply_orientation_rgb(&buf, 3, 2, 1);
        assert_eq!((w, h), (3, 2));
        assert_eq!(out, buf);
    }

    #[test]
    fn test_orientation_rotate_90_cw() {
        // [1, 2, 3]      [4, 1]
        // [4, 5, 6]  ->  [5, 2]
        //                [6, 3]
        let (out, w, h) = apply_orientation_rgb(&grid(&[1, 2, 3, 4, 5, 6]), 3, 2, 6);
        assert_eq!((w, h), (2, 3));
        assert_eq!(out, grid(&[4, 1, 5, 2, 6, 3]));
    }

    #[test]
    fn test_orientation_rotate_180() {
        let (out, w, h) = apply_orientation_rgb(&grid(&[1, 2, 3, 4, 5, 6]), 3, 2, 3);
        assert_eq!((w, h), (3, 2));
        assert_eq!(out, grid(&[6, 5, 4, 3, 2, 1]));
    }

    #[test]
    fn test_orientation_rotate_90_ccw() {
        let (out, w, h) = apply_orientation_rgb(&grid(&[1, 2, 3, 4, 5, 6]), 3, 2, 8);
        assert_eq!((w, h), (2, 3));
        assert_eq!(out, grid(&[3, 6, 2, 5, 1, 4]));
    }

    #[test]
    fn test_cover_size() {
        assert_eq!(cover_size(4000, 3000, 300, 300), (400, 300));
        assert_eq!(cover_size(3000, 4000, 300, 300), (300, 400));
        assert_eq!(cover_size(200, 100, 300, 300), (200, 100));
        assert_eq!(cover_size(0, 0, 300, 300), (0, 0));
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("+09:00"), FixedOffset::east_opt(9 * 3600));
        assert_eq!(parse_offset("-05:30"), FixedOffset::east_opt(-(5 * 3600 + 30 * 60)));
        assert_eq!(parse_offset("09:00"), None);
        assert_eq!(parse_offset(""), None);
    }

    #[test]
    fn test_load_png_scaled_to_cover() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wide.png");
        RgbImage::from_fn(800, 400, |x, _| image::Rgb([(x % 256) as u8, 0, 0]))
            .save(&path)
            .unwrap();

        let request = ImageRequest::new(100, 100, Duration::from_secs(1));
        let img = load_for_request(&path, &request).unwrap();
        assert_eq!((img.width(), img.height()), (200, 100));
    }

    #[test]
    fn test_load_jpeg_fast_delivery() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("photo.jpg");
        RgbImage::from_fn(640, 480, |_, y| image::Rgb([0, (y % 256) as u8, 0]))
            .save(&path)
            .unwrap();

        let request = ImageRequest::new(64, 64, Duration::from_secs(1)).delivery(Delivery::Fast);
        let img = load_for_request(&path, &request).unwrap();
        assert_eq!(img.height(), 64);
    }

    #[test]
    fn test_load_garbage_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        let request = ImageRequest::new(64, 64, Duration::from_secs(1));
        assert!(load_for_request(&path, &request).is_err());
    }

    #[test]
    fn test_capture_date_missing_exif() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("plain.png");
        RgbImage::new(2, 2).save(&path).unwrap();
        assert!(read_capture_date(&path).is_none());
    }
}
