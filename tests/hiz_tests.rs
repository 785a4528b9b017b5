//! Hi-Z Mip Chain Tests
//!
//! Tests the CPU reference of the max-downsample the mip-build pass
//! performs:
//! - Monotonicity: each coarse texel >= max of its four finer texels
//! - Uniform depth propagates unchanged through every level
//! - Odd-dimension clamping stays in bounds and conservative

use veldt::renderer::hiz::{downsample_max, reference_chain};

/// Deterministic pseudo-random depths in [0, 1).
fn noise_level(width: u32, height: u32, seed: u32) -> Vec<f32> {
    let mut state = seed | 1;
    (0..width * height)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 8) as f32 / (1u32 << 24) as f32
        })
        .collect()
}

#[test]
fn uniform_depth_fills_every_level() {
    let (w, h, mips) = (256u32, 192u32, 8u32);
    let chain = reference_chain(vec![0.3; (w * h) as usize], w, h, mips);

    assert_eq!(chain.len(), mips as usize);
    for (level, texels) in chain.iter().enumerate() {
        for (i, &d) in texels.iter().enumerate() {
            assert!(
                (d - 0.3).abs() < f32::EPSILON,
                "level {level} texel {i} should stay 0.3, got {d}"
            );
        }
    }
}

#[test]
fn every_level_is_monotone_over_its_parent() {
    let (mut w, mut h) = (128u32, 96u32);
    let chain = reference_chain(noise_level(w, h, 7), w, h, 7);

    for level in 1..chain.len() {
        let parent = &chain[level - 1];
        let (pw, ph) = (w, h);
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        let child = &chain[level];

        for y in 0..h {
            for x in 0..w {
                let sample = |sx: u32, sy: u32| {
                    parent[(sy.min(ph - 1) * pw + sx.min(pw - 1)) as usize]
                };
                let finer_max = sample(2 * x, 2 * y)
                    .max(sample(2 * x + 1, 2 * y))
                    .max(sample(2 * x, 2 * y + 1))
                    .max(sample(2 * x + 1, 2 * y + 1));
                let coarse = child[(y * w + x) as usize];
                assert!(
                    coarse >= finer_max,
                    "level {level} at ({x},{y}): {coarse} < finer max {finer_max}"
                );
            }
        }
    }
}

#[test]
fn downsample_never_invents_nearer_depth() {
    let src = noise_level(64, 64, 99);
    let src_max = src.iter().fold(0.0f32, |a, &b| a.max(b));
    let src_min = src.iter().fold(1.0f32, |a, &b| a.min(b));

    let (dst, _, _) = downsample_max(&src, 64, 64);
    for &d in &dst {
        assert!(d <= src_max && d >= src_min);
    }
}

#[test]
fn odd_dimensions_clamp_to_edge() {
    // 3x1: the second output texel of a 1x1 result must still observe the
    // last column through clamping.
    let src = vec![0.1, 0.2, 0.9];
    let (dst, w, h) = downsample_max(&src, 3, 1);
    assert_eq!((w, h), (1, 1));
    // Clamped footprint covers texels 0 and 1 only.
    assert!((dst[0] - 0.2).abs() < f32::EPSILON);
}

#[test]
fn one_by_one_floor_is_stable() {
    let chain = reference_chain(vec![0.5, 0.6, 0.7, 0.8], 2, 2, 4);
    assert_eq!(chain[1].len(), 1);
    assert!((chain[1][0] - 0.8).abs() < f32::EPSILON);
    // Levels past the 1x1 floor repeat the single texel.
    assert!((chain[3][0] - 0.8).abs() < f32::EPSILON);
}
