use lazy_static::lazy_static;
use regex::Regex;

use crate::source::{Format, MediaKind};

lazy_static! {
    static ref QUALITY_LABEL_RE: Regex = Regex::new(r"^(\d+p)(\d+)?$").unwrap();
}

/// Target height for a quality string: `4k` is 2160, otherwise the leading digits.
pub fn parse_quality(quality: &str) -> u32 {
    if quality == "4k" {
        return 2160;
    }

    let digits: String = quality.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

fn height_of(format: &Format) -> u32 {
    format.quality_label.as_deref().map_or(0, parse_quality)
}

/// Exact height match if one exists, else the tallest at or below the target,
/// else the tallest overall. Ties go to the first seen.
pub fn select_video(formats: &[Format], target_height: u32) -> Option<&Format> {
    let videos = || formats.iter().filter(|f| f.kind == MediaKind::Video);

    if let Some(exact) = videos().find(|f| height_of(f) == target_height) {
        return Some(exact);
    }

    let mut best: Option<&Format> = None;
    for format in videos().filter(|f| height_of(f) <= target_height) {
        if best.map_or(true, |b| height_of(format) > height_of(b)) {
            best = Some(format);
        }
    }

    best.or_else(|| {
        let mut tallest: Option<&Format> = None;
        for format in videos() {
            if tallest.map_or(true, |t| height_of(format) > height_of(t)) {
                tallest = Some(format);
            }
        }
        tallest
    })
}

/// First MP4-compatible audio track, else the first audio track at all.
pub fn select_audio(formats: &[Format]) -> Option<&Format> {
    let audios = || formats.iter().filter(|f| f.kind == MediaKind::Audio);

    audios().find(|f| f.is_mp4_family()).or_else(|| audios().next())
}

pub fn select<'a>(formats: &'a [Format], quality: &str) -> Option<(&'a Format, &'a Format)> {
    let video = select_video(formats, parse_quality(quality))?;
    let audio = select_audio(formats)?;
    Some((video, audio))
}

/// `1080p60` becomes `1080p 60fps`; anything unrecognised is returned unchanged.
pub fn format_quality_label(label: &str) -> String {
    match QUALITY_LABEL_RE.captures(label) {
        Some(caps) => match caps.get(2) {
            Some(fps) => format!("{} {}fps", &caps[1], fps.as_str()),
            None => caps[1].to_owned(),
        },
        None => label.to_owned(),
    }
}

/// Distinct video heights on offer, tallest first, rendered for display.
pub fn available_qualities(formats: &[Format]) -> Vec<String> {
    let mut by_height: Vec<(u32, String)> = Vec::new();

    for format in formats.iter().filter(|f| f.kind == MediaKind::Video) {
        let Some(label) = format.quality_label.as_deref() else {
            continue;
        };
        let height = parse_quality(label);
        if height == 0 {
            continue;
        }

        let rendered = format_quality_label(label);
        match by_height.iter_mut().find(|(h, _)| *h == height) {
            Some(entry) => entry.1 = rendered,
            None => by_height.push((height, rendered)),
        }
    }

    by_height.sort_by(|a, b| b.0.cmp(&a.0));
    by_height.into_iter().map(|(_, label)| label).collect()
}
