use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, RgbaImage};
use serde::Serialize;

use crate::error::PlatformError;
use crate::layout::Point;

const MIN_COARSE_SIDE: u32 = 8;
const COARSE_CANDIDATES: usize = 8;
const SAMPLE_GRID: u32 = 8;
const SAMPLE_CANDIDATES: usize = 16;
const FLAT_EPSILON: f64 = 1e-6;
const FLAT_MEAN_TOLERANCE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Match {
    pub center: Point,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub score: f32,
}

pub fn locate_on_screen(
    screen: &RgbaImage,
    template: &GrayImage,
    confidence: f32,
) -> Option<Match> {
    find_template(&image::imageops::grayscale(screen), template, confidence)
}

pub fn find_template(screen: &GrayImage, template: &GrayImage, confidence: f32) -> Option<Match> {
    best_match(screen, template, confidence).filter(|m| m.score >= confidence)
}

/// Highest-scoring placement of `template` inside `screen` by zero-mean
/// normalized cross-correlation. The coarse pass is trusted only when its
/// refined best reaches `confidence`; otherwise every full-resolution
/// placement is pre-scored on a sample grid of the template as well.
pub fn best_match(screen: &GrayImage, template: &GrayImage, confidence: f32) -> Option<Match> {
    let (sw, sh) = screen.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > sw || th > sh {
        return None;
    }

    let factor = coarse_factor(tw.min(th));
    let full = Prepared::new(screen, template);

    let (x, y, score) = if factor == 1 {
        let mut best = (0, 0, f64::MIN);
        for y in 0..=(sh - th) {
            for x in 0..=(sw - tw) {
                let s = full.score(x, y);
                if s > best.2 {
                    best = (x, y, s);
                }
            }
        }
        best
    } else {
        let coarse_screen = downsample(screen, factor);
        let coarse_template = downsample(template, factor);
        let coarse = Prepared::new(&coarse_screen, &coarse_template);
        let (cw, ch) = coarse_screen.dimensions();
        let (ctw, cth) = coarse_template.dimensions();

        let mut candidates = Vec::with_capacity(COARSE_CANDIDATES + 1);
        for cy in 0..=(ch - cth) {
            for cx in 0..=(cw - ctw) {
                keep_best(&mut candidates, COARSE_CANDIDATES, (coarse.score(cx, cy), cx, cy));
            }
        }

        let mut best = (0, 0, f64::MIN);
        for (_, cx, cy) in candidates {
            let x0 = (cx * factor).saturating_sub(factor);
            let y0 = (cy * factor).saturating_sub(factor);
            let x1 = (cx * factor + factor).min(sw - tw);
            let y1 = (cy * factor + factor).min(sh - th);
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let s = full.score(x, y);
                    if s > best.2 {
                        best = (x, y, s);
                    }
                }
            }
        }

        // Fine texture averages out when downsampled, so the true placement
        // can fall outside the coarse candidates.
        if best.2 < f64::from(confidence) {
            let sampled = sampled_search(screen, template, &full);
            if sampled.2 > best.2 {
                best = sampled;
            }
        }
        best
    };

    Some(Match {
        center: Point::new((x + tw / 2) as i32, (y + th / 2) as i32),
        x,
        y,
        w: tw,
        h: th,
        score: score as f32,
    })
}

/// Inserts `entry` into `candidates`, kept sorted by descending score and at
/// most `cap` long.
fn keep_best(candidates: &mut Vec<(f64, u32, u32)>, cap: usize, entry: (f64, u32, u32)) {
    if candidates.len() == cap && candidates.last().is_some_and(|worst| entry.0 <= worst.0) {
        return;
    }
    let pos = candidates
        .iter()
        .position(|c| entry.0 > c.0)
        .unwrap_or(candidates.len());
    candidates.insert(pos, entry);
    candidates.truncate(cap);
}

/// Scores every full-resolution placement on at most `SAMPLE_GRID` squared
/// template pixels, then scores the best of those exactly.
fn sampled_search(screen: &GrayImage, template: &GrayImage, full: &Prepared) -> (u32, u32, f64) {
    let (sw, sh) = screen.dimensions();
    let (tw, th) = template.dimensions();
    let step_x = tw.div_ceil(SAMPLE_GRID).max(1) as usize;
    let step_y = th.div_ceil(SAMPLE_GRID).max(1) as usize;

    let mut samples: Vec<(usize, f64)> = Vec::new();
    for ty in (0..th).step_by(step_y) {
        for tx in (0..tw).step_by(step_x) {
            let offset = ty as usize * sw as usize + tx as usize;
            samples.push((offset, f64::from(template.get_pixel(tx, ty).0[0])));
        }
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|s| s.1).sum::<f64>() / n;
    for sample in &mut samples {
        sample.1 -= mean;
    }
    let norm = samples.iter().map(|s| s.1 * s.1).sum::<f64>().sqrt();
    if norm < FLAT_EPSILON {
        return (0, 0, f64::MIN);
    }

    let raw = screen.as_raw();
    let mut candidates = Vec::with_capacity(SAMPLE_CANDIDATES + 1);
    for y in 0..=(sh - th) {
        for x in 0..=(sw - tw) {
            let base = y as usize * sw as usize + x as usize;
            let (mut sum, mut sq, mut dot) = (0.0, 0.0, 0.0);
            for &(offset, centered) in &samples {
                let v = f64::from(raw[base + offset]);
                sum += v;
                sq += v * v;
                dot += centered * v;
            }
            let var = sq - sum * sum / n;
            if var < FLAT_EPSILON {
                continue;
            }
            keep_best(&mut candidates, SAMPLE_CANDIDATES, (dot / (norm * var.sqrt()), x, y));
        }
    }

    candidates
        .into_iter()
        .map(|(_, x, y)| (x, y, full.score(x, y)))
        .fold((0, 0, f64::MIN), |best, c| if c.2 > best.2 { c } else { best })
}

fn coarse_factor(short_side: u32) -> u32 {
    [8, 4, 2]
        .into_iter()
        .find(|f| short_side / f >= MIN_COARSE_SIDE)
        .unwrap_or(1)
}

fn downsample(img: &GrayImage, factor: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    let (dw, dh) = ((w / factor).max(1), (h / factor).max(1));
    let area = factor * factor;
    GrayImage::from_fn(dw, dh, |x, y| {
        let mut acc = 0u32;
        for yy in 0..factor {
            for xx in 0..factor {
                let sx = (x * factor + xx).min(w - 1);
                let sy = (y * factor + yy).min(h - 1);
                acc += u32::from(img.get_pixel(sx, sy).0[0]);
            }
        }
        Luma([(acc / area) as u8])
    })
}

/// Summed-area tables of the screen plus the zero-mean template.
struct Prepared<'a> {
    screen: &'a GrayImage,
    stride: usize,
    sum: Vec<u64>,
    sq: Vec<u64>,
    tw: u32,
    th: u32,
    centered: Vec<f64>,
    t_norm: f64,
    t_mean: f64,
}

impl<'a> Prepared<'a> {
    fn new(screen: &'a GrayImage, template: &GrayImage) -> Self {
        let (w, h) = screen.dimensions();
        let stride = w as usize + 1;
        let mut sum = vec![0u64; stride * (h as usize + 1)];
        let mut sq = vec![0u64; stride * (h as usize + 1)];
        let raw = screen.as_raw();
        for y in 0..h as usize {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w as usize {
                let v = u64::from(raw[y * w as usize + x]);
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_sq;
            }
        }

        let (tw, th) = template.dimensions();
        let n = f64::from(tw * th);
        let t_mean = template.as_raw().iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let centered: Vec<f64> = template
            .as_raw()
            .iter()
            .map(|&v| f64::from(v) - t_mean)
            .collect();
        let t_norm = centered.iter().map(|v| v * v).sum::<f64>().sqrt();

        Self {
            screen,
            stride,
            sum,
            sq,
            tw,
            th,
            centered,
            t_norm,
            t_mean,
        }
    }

    fn window_stats(&self, x: u32, y: u32) -> (f64, f64) {
        let (x, y) = (x as usize, y as usize);
        let (w, h) = (self.tw as usize, self.th as usize);
        let a = y * self.stride + x;
        let b = a + w;
        let c = (y + h) * self.stride + x;
        let d = c + w;
        let s = (self.sum[d] + self.sum[a]) as f64 - (self.sum[b] + self.sum[c]) as f64;
        let q = (self.sq[d] + self.sq[a]) as f64 - (self.sq[b] + self.sq[c]) as f64;
        (s, q)
    }

    fn score(&self, x: u32, y: u32) -> f64 {
        let n = f64::from(self.tw * self.th);
        let (s, q) = self.window_stats(x, y);
        let mean = s / n;
        let var = (q - s * mean).max(0.0);

        if self.t_norm < FLAT_EPSILON {
            let flat = var < FLAT_EPSILON * n;
            return if flat && (mean - self.t_mean).abs() <= FLAT_MEAN_TOLERANCE {
                1.0
            } else {
                0.0
            };
        }
        if var < FLAT_EPSILON {
            return 0.0;
        }

        let width = self.screen.width() as usize;
        let raw = self.screen.as_raw();
        let tw = self.tw as usize;
        let mut dot = 0.0;
        for ty in 0..self.th as usize {
            let row = (y as usize + ty) * width + x as usize;
            let trow = ty * tw;
            for tx in 0..tw {
                dot += self.centered[trow + tx] * f64::from(raw[row + tx]);
            }
        }
        dot / (self.t_norm * var.sqrt())
    }
}

/// Grayscale templates loaded once per run.
#[derive(Debug, Default)]
pub struct TemplateCache {
    loaded: HashMap<PathBuf, GrayImage>,
}

impl TemplateCache {
    pub fn get(&mut self, path: &Path) -> Result<&GrayImage, PlatformError> {
        match self.loaded.entry(path.to_path_buf()) {
            Entry::Occupied(cached) => Ok(cached.into_mut()),
            Entry::Vacant(slot) => {
                let img = image::open(path).map_err(|source| PlatformError::Template {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok(slot.insert(img.to_luma8()))
            }
        }
    }
}
