// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Placeholder avatars for participants without a usable photo.
//!
//! A missing photo degrades one participant's credential, never the whole
//! job: their card gets initials over a two-stop vertical gradient. The
//! gradient colors derive from a stable hash of the participant name, so
//! regeneration produces the identical placeholder.

use image::{Rgba, RgbaImage};
use sha2::{Digest, Sha256};

/// Gradient stops (top, bottom) for a participant name.
///
/// Channels are mapped into the 88..200 band so the white initials stay
/// legible on any derived color.
pub fn gradient_palette(name: &str) -> (Rgba<u8>, Rgba<u8>) {
    let digest = Sha256::digest(name.trim().to_ascii_lowercase().as_bytes());
    let channel = |b: u8| 88 + (b % 112);
    let top = Rgba([channel(digest[0]), channel(digest[1]), channel(digest[2]), 255]);
    let bottom = Rgba([
        (top.0[0] as f32 * 0.55) as u8,
        (top.0[1] as f32 * 0.55) as u8,
        (top.0[2] as f32 * 0.55) as u8,
        255,
    ]);
    (top, bottom)
}

/// Up to two initials from the first words of the name, uppercased.
pub fn initials(name: &str) -> String {
    let letters: String = name
        .split_whitespace()
        .take(2)
        .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
        .flat_map(|c| c.to_uppercase())
        .collect();
    if letters.is_empty() {
        "?".to_string()
    } else {
        letters
    }
}

/// Render the gradient backdrop of a `side`×`side` placeholder tile.
/// Initials are drawn on top by the compositor, which owns the typeface.
pub fn gradient_tile(side: u32, name: &str) -> RgbaImage {
    let (top, bottom) = gradient_palette(name);
    RgbaImage::from_fn(side, side, |_, y| {
        let t = if side <= 1 {
            0.0
        } else {
            y as f32 / (side - 1) as f32
        };
        let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgba([
            lerp(top.0[0], bottom.0[0]),
            lerp(top.0[1], bottom.0[1]),
            lerp(top.0[2], bottom.0[2]),
            255,
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initials_take_the_first_two_words() {
        assert_eq!(initials("Asha Rao"), "AR");
        assert_eq!(initials("asha"), "A");
        assert_eq!(initials("Asha Devi Rao"), "AD");
        assert_eq!(initials("  "), "?");
        assert_eq!(initials(""), "?");
    }

    #[test]
    fn palette_is_deterministic_and_name_dependent() {
        assert_eq!(gradient_palette("Asha Rao"), gradient_palette("Asha Rao"));
        // Case and padding do not change the derived colors.
        assert_eq!(gradient_palette("Asha Rao"), gradient_palette(" asha rao "));
        assert_ne!(gradient_palette("Asha Rao"), gradient_palette("Binod K"));
    }

    #[test]
    fn palette_channels_keep_initials_legible() {
        for name in ["Asha Rao", "Binod K", "Chitra M", "x"] {
            let (top, bottom) = gradient_palette(name);
            for c in &top.0[..3] {
                assert!((88..200).contains(c));
            }
            for c in &bottom.0[..3] {
                assert!(*c < 120);
            }
        }
    }

    #[test]
    fn gradient_tile_is_reproducible() {
        let a = gradient_tile(64, "Asha Rao");
        let b = gradient_tile(64, "Asha Rao");
        assert_eq!(a.as_raw(), b.as_raw());

        // Darkens monotonically top to bottom (red channel).
        let top = a.get_pixel(32, 0).0[0];
        let bottom = a.get_pixel(32, 63).0[0];
        assert!(top > bottom);
    }
}
