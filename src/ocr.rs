use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tracing::warn;

/// Runs tesseract over an uploaded image and returns the recognized
/// plain text. Small images are upscaled before recognition; a faint
/// result falls back to a hard-thresholded variant.
pub fn image_to_text(image_bytes: &[u8], ocr_languages: &str) -> Result<String> {
    let image =
        image::load_from_memory(image_bytes).with_context(|| "failed to decode image for OCR")?;
    let (width, _height) = image.dimensions();
    let scale = ocr_scale(width);
    let languages = normalize_ocr_languages(ocr_languages)?;

    let (stretched, binarized) = preprocess_for_ocr(image, scale);
    let text = ocr_pass(stretched, &languages)?;
    if !text.trim().is_empty() {
        return Ok(text.trim().to_string());
    }
    let text = ocr_pass(binarized, &languages)?;
    Ok(text.trim().to_string())
}

fn ocr_pass(image: image::GrayImage, languages: &str) -> Result<String> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .with_context(|| "failed to create temp file for OCR")?;
    image::DynamicImage::ImageLuma8(image)
        .write_to(&mut tmp, image::ImageFormat::Png)
        .with_context(|| "failed to write temp image for OCR")?;
    tmp.flush().ok();
    run_tesseract_text(tmp.path(), languages)
}

fn run_tesseract_text(path: &Path, languages: &str) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--dpi")
        .arg("300")
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut langs = Vec::new();
    for (idx, line) in stdout.lines().enumerate() {
        // First line is the "List of available languages" banner.
        if idx == 0 {
            continue;
        }
        let value = line.trim();
        if !value.is_empty() {
            langs.push(value.to_string());
        }
    }
    Ok(langs)
}

fn normalize_ocr_languages(requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }

    let available = match list_tesseract_languages() {
        Ok(list) => list,
        Err(_) => return Ok(trimmed.to_string()),
    };

    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for raw in trimmed.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }

    Ok(chosen.join("+"))
}

fn preprocess_for_ocr(
    image: image::DynamicImage,
    scale: u32,
) -> (image::GrayImage, image::GrayImage) {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = image::GrayImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = (r as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let g = (g as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let b = (b as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let value = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8;
        luma.put_pixel(x, y, image::Luma([value]));
    }

    let resized = if scale > 1 {
        image::imageops::resize(
            &luma,
            width.saturating_mul(scale),
            height.saturating_mul(scale),
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        luma
    };

    let stretched = contrast_stretch(&resized);
    let threshold = (0.65 * 255.0) as u8;
    let binarized = binarize(&stretched, threshold);
    (stretched, binarized)
}

fn contrast_stretch(image: &image::GrayImage) -> image::GrayImage {
    let mut min = 255u8;
    let mut max = 0u8;
    for pixel in image.pixels() {
        let value = pixel[0];
        min = min.min(value);
        max = max.max(value);
    }

    if max <= min {
        return image.clone();
    }

    let scale = 255.0 / (max as f32 - min as f32);
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        let value = pixel[0];
        pixel[0] = ((value.saturating_sub(min)) as f32 * scale).round() as u8;
    }
    output
}

fn binarize(image: &image::GrayImage, threshold: u8) -> image::GrayImage {
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = if pixel[0] > threshold { 255 } else { 0 };
    }
    output
}

fn ocr_scale(width: u32) -> u32 {
    let max_width = 6000u32;
    let mut scale = 3u32;
    while width.saturating_mul(scale) > max_width && scale > 1 {
        scale -= 1;
    }
    scale.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_images_get_the_largest_scale() {
        assert_eq!(ocr_scale(500), 3);
        assert_eq!(ocr_scale(2500), 2);
        assert_eq!(ocr_scale(6000), 1);
        assert_eq!(ocr_scale(9000), 1);
    }

    #[test]
    fn contrast_stretch_expands_the_range() {
        let image = image::GrayImage::from_raw(3, 1, vec![100, 150, 200]).unwrap();
        let stretched = contrast_stretch(&image);
        let values: Vec<u8> = stretched.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![0, 128, 255]);
    }

    #[test]
    fn flat_images_are_left_alone() {
        let image = image::GrayImage::from_raw(2, 1, vec![90, 90]).unwrap();
        let stretched = contrast_stretch(&image);
        let values: Vec<u8> = stretched.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![90, 90]);
    }

    #[test]
    fn binarize_splits_at_the_threshold() {
        let image = image::GrayImage::from_raw(3, 1, vec![10, 165, 240]).unwrap();
        let binarized = binarize(&image, 165);
        let values: Vec<u8> = binarized.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![0, 0, 255]);
    }

    #[test]
    fn preprocess_upscales_by_the_given_factor() {
        let rgba = image::RgbaImage::from_pixel(4, 2, image::Rgba([80, 80, 80, 255]));
        let (stretched, binarized) = preprocess_for_ocr(image::DynamicImage::ImageRgba8(rgba), 3);
        assert_eq!(stretched.dimensions(), (12, 6));
        assert_eq!(binarized.dimensions(), (12, 6));
    }
}
