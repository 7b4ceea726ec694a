use image::GrayImage;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use std::collections::HashSet;

/// A straight edge segment in crop pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl LineSegment {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn length(&self) -> f32 {
        let dx = self.x2 - self.x1;
        let dy = self.y2 - self.y1;
        (dx * dx + dy * dy).sqrt()
    }

    /// Signed angle to horizontal in degrees, in (-90, 90]. Image y grows
    /// downward, so a positive angle descends to the right.
    pub fn angle_deg(&self) -> f32 {
        let mut dx = self.x2 - self.x1;
        let mut dy = self.y2 - self.y1;
        if dx < 0.0 || (dx == 0.0 && dy < 0.0) {
            dx = -dx;
            dy = -dy;
        }
        dy.atan2(dx).to_degrees()
    }

    fn is_near(&self, other: &LineSegment, tolerance: f32) -> bool {
        let close = |ax: f32, ay: f32, bx: f32, by: f32| {
            (ax - bx).abs() <= tolerance && (ay - by).abs() <= tolerance
        };
        (close(self.x1, self.y1, other.x1, other.y1) && close(self.x2, self.y2, other.x2, other.y2))
            || (close(self.x1, self.y1, other.x2, other.y2) && close(self.x2, self.y2, other.x1, other.y1))
    }
}

/// Parameters of the segment extractor.
#[derive(Debug, Clone)]
pub struct SegmentOptions {
    /// Minimum Hough accumulator votes for a candidate line.
    pub vote_threshold: u32,
    /// Minimum segment length in pixels.
    pub min_length: f32,
    /// Largest run of missing edge pixels bridged inside one segment.
    pub max_gap: f32,
    /// Half-width, in pixels, of the strip searched around a candidate line.
    pub band: f32,
    /// Non-maximum suppression radius in the (r, angle) accumulator.
    pub suppression_radius: u32,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            vote_threshold: 20,
            min_length: 25.0,
            max_gap: 5.0,
            band: 2.0,
            suppression_radius: 4,
        }
    }
}

/// Line through `origin` with unit `direction`; `normal` is perpendicular.
#[derive(Debug, Clone, Copy)]
struct Ray {
    origin: (f32, f32),
    direction: (f32, f32),
    normal: (f32, f32),
}

impl Ray {
    fn from_polar(line: &PolarLine) -> Self {
        // imageproc votes with r = x*cos(m) + y*sin(m)
        let theta = (line.angle_in_degrees as f32).to_radians();
        let (sin, cos) = theta.sin_cos();
        Self {
            origin: (line.r * cos, line.r * sin),
            direction: (-sin, cos),
            normal: (cos, sin),
        }
    }

    fn from_fit(centroid: (f32, f32), direction: (f32, f32)) -> Self {
        Self {
            origin: centroid,
            direction,
            normal: (-direction.1, direction.0),
        }
    }
}

/// Edge pixels collected along a ray, in walk order.
#[derive(Debug, Default)]
struct Run {
    pixels: Vec<(u32, u32)>,
}

/// Extract straight segments from an edge map.
///
/// Candidate lines come from Hough voting over the edge pixels. Each candidate
/// is walked across the image; edge pixels within `band` of the line are
/// grouped into runs, splitting wherever more than `max_gap` pixels pass
/// without a hit. Each run is refitted by total least squares and re-walked
/// along the fitted line, so the reported angle is not limited to the
/// accumulator's one-degree bins. Segments are returned in accumulator order.
pub fn extract_segments(edges: &GrayImage, options: &SegmentOptions) -> Vec<LineSegment> {
    let candidates = detect_lines(
        edges,
        LineDetectionOptions {
            vote_threshold: options.vote_threshold,
            suppression_radius: options.suppression_radius,
        },
    );

    let mut segments: Vec<LineSegment> = Vec::new();
    for line in &candidates {
        let ray = Ray::from_polar(line);
        for run in walk(edges, &ray, options.band, options.max_gap) {
            let Some(segment) = refine(edges, &run, options) else {
                continue;
            };
            if segment.length() < options.min_length {
                continue;
            }
            if segments.iter().any(|s| s.is_near(&segment, 2.0)) {
                continue;
            }
            segments.push(segment);
        }
    }

    segments
}

fn walk(edges: &GrayImage, ray: &Ray, band: f32, max_gap: f32) -> Vec<Run> {
    let (width, height) = edges.dimensions();
    let diag = ((width as f32).powi(2) + (height as f32).powi(2)).sqrt().ceil() as i32;
    let reach = band.round().max(0.0) as i32;

    let mut runs = Vec::new();
    let mut current = Run::default();
    let mut last_hit: Option<i32> = None;
    let mut seen: HashSet<(u32, u32)> = HashSet::new();

    for t in -diag..=diag {
        let px = ray.origin.0 + t as f32 * ray.direction.0;
        let py = ray.origin.1 + t as f32 * ray.direction.1;

        let mut hits = Vec::new();
        for k in -reach..=reach {
            let qx = (px + k as f32 * ray.normal.0).round();
            let qy = (py + k as f32 * ray.normal.1).round();
            if qx < 0.0 || qy < 0.0 || qx >= width as f32 || qy >= height as f32 {
                continue;
            }
            let (x, y) = (qx as u32, qy as u32);
            if edges.get_pixel(x, y)[0] > 0 && seen.insert((x, y)) {
                hits.push((x, y));
            }
        }

        if hits.is_empty() {
            continue;
        }
        if let Some(last) = last_hit
            && (t - last) as f32 > max_gap + 1.0
        {
            runs.push(std::mem::take(&mut current));
        }
        current.pixels.extend(hits);
        last_hit = Some(t);
    }

    if !current.pixels.is_empty() {
        runs.push(current);
    }
    runs
}

/// Total least squares fit: returns centroid and unit direction.
fn fit(pixels: &[(u32, u32)]) -> Option<((f32, f32), (f32, f32))> {
    if pixels.len() < 2 {
        return None;
    }
    let n = pixels.len() as f64;
    let mx = pixels.iter().map(|p| p.0 as f64).sum::<f64>() / n;
    let my = pixels.iter().map(|p| p.1 as f64).sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0.0f64, 0.0f64, 0.0f64);
    for &(x, y) in pixels {
        let dx = x as f64 - mx;
        let dy = y as f64 - my;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx + syy == 0.0 {
        return None;
    }

    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    Some(((mx as f32, my as f32), (theta.cos() as f32, theta.sin() as f32)))
}

fn span(pixels: &[(u32, u32)], centroid: (f32, f32), direction: (f32, f32)) -> LineSegment {
    let mut t_min = f32::MAX;
    let mut t_max = f32::MIN;
    for &(x, y) in pixels {
        let t = (x as f32 - centroid.0) * direction.0 + (y as f32 - centroid.1) * direction.1;
        t_min = t_min.min(t);
        t_max = t_max.max(t);
    }
    LineSegment::new(
        centroid.0 + t_min * direction.0,
        centroid.1 + t_min * direction.1,
        centroid.0 + t_max * direction.0,
        centroid.1 + t_max * direction.1,
    )
}

fn refine(edges: &GrayImage, run: &Run, options: &SegmentOptions) -> Option<LineSegment> {
    let (centroid, direction) = fit(&run.pixels)?;

    let original: HashSet<(u32, u32)> = run.pixels.iter().copied().collect();
    let rewalked = walk(edges, &Ray::from_fit(centroid, direction), 1.0, options.max_gap)
        .into_iter()
        .max_by_key(|r| r.pixels.iter().filter(|p| original.contains(p)).count());

    match rewalked {
        Some(r) if r.pixels.len() >= 2 => {
            let (centroid, direction) = fit(&r.pixels)?;
            Some(span(&r.pixels, centroid, direction))
        }
        _ => Some(span(&run.pixels, centroid, direction)),
    }
}
