// SPDX-License-Identifier: GPL-3.0-only

//! Face detection task
//!
//! Evaluates a boosted Haar cascade (OpenCV `opencv-cascade-classifier` XML)
//! over an intensity image. The image is scaled down through a pyramid and a
//! fixed-size window slides over every level; raw hits are then merged with
//! the usual neighbour grouping so each face is reported once.

use crate::app::frame_processor::types::{DetectionParams, FaceBox};
use crate::errors::DetectorError;
use image::GrayImage;
use image::imageops::{self, FilterType};
use std::path::Path;
use tracing::{debug, info, trace};

/// Relative tolerance used when merging overlapping hits
const GROUP_EPS: f64 = 0.2;

/// Face detector collaborator
///
/// Implementations only read the image; `detect` never mutates detector
/// state, so one instance serves the whole preview loop.
pub trait FaceDetector {
    fn detect(
        &self,
        image: &GrayImage,
        params: &DetectionParams,
    ) -> Result<Vec<FaceBox>, DetectorError>;
}

#[derive(Debug, Clone, Copy)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

#[derive(Debug, Clone)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
}

#[derive(Debug, Clone, Copy)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

/// Boosted Haar cascade loaded from an OpenCV XML definition
#[derive(Debug, Clone)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    /// Load a cascade file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DetectorError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DetectorError::LoadFailed(format!("{}: {}", path.display(), e)))?;
        let cascade = Self::from_xml(&text)?;

        info!(
            path = %path.display(),
            stages = cascade.stages.len(),
            features = cascade.features.len(),
            window = %format!("{}x{}", cascade.window_width, cascade.window_height),
            "Loaded face cascade"
        );
        Ok(cascade)
    }

    /// Parse a cascade from OpenCV XML text
    pub fn from_xml(text: &str) -> Result<Self, DetectorError> {
        let doc = roxmltree::Document::parse(text)
            .map_err(|e| DetectorError::InvalidCascade(format!("XML: {}", e)))?;

        let cascade = doc
            .root_element()
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "cascade")
            .ok_or_else(|| invalid("missing <cascade> element"))?;

        let stage_type = child_text(&cascade, "stageType")?;
        if stage_type != "BOOST" {
            return Err(invalid(format!("unsupported stage type '{}'", stage_type)));
        }
        let feature_type = child_text(&cascade, "featureType")?;
        if feature_type != "HAAR" {
            return Err(invalid(format!("unsupported feature type '{}'", feature_type)));
        }

        let window_width: u32 = parse_value(child_text(&cascade, "width")?)?;
        let window_height: u32 = parse_value(child_text(&cascade, "height")?)?;
        if window_width < 3 || window_height < 3 {
            return Err(invalid("window smaller than 3x3"));
        }

        let features = items(child(&cascade, "features")?)
            .map(|node| parse_feature(&node, window_width, window_height))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = items(child(&cascade, "stages")?)
            .map(|node| parse_stage(&node, features.len()))
            .collect::<Result<Vec<_>, _>>()?;

        if stages.is_empty() {
            return Err(invalid("cascade has no stages"));
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    /// Detector window size (width, height)
    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage on the window at `(x, y)`; true when all pass
    fn classify(&self, integral: &IntegralImage, x: u32, y: u32) -> bool {
        // Normalise by the standard deviation of the inner window
        let inner_w = self.window_width - 2;
        let inner_h = self.window_height - 2;
        let area = (inner_w * inner_h) as f64;
        let sum = integral.sum(x + 1, y + 1, inner_w, inner_h) as f64;
        let sq_sum = integral.sq_sum(x + 1, y + 1, inner_w, inner_h) as f64;
        let variance = area * sq_sum - sum * sum;
        let norm = if variance > 0.0 { variance.sqrt() } else { 1.0 };

        for stage in &self.stages {
            let mut stage_sum = 0.0;
            for classifier in &stage.classifiers {
                stage_sum += self.evaluate(classifier, integral, x, y, norm);
            }
            if stage_sum < stage.threshold {
                return false;
            }
        }
        true
    }

    fn evaluate(
        &self,
        classifier: &WeakClassifier,
        integral: &IntegralImage,
        x: u32,
        y: u32,
        norm: f64,
    ) -> f64 {
        let mut idx = 0i32;
        loop {
            let node = &classifier.nodes[idx as usize];
            let value: f64 = self.features[node.feature]
                .rects
                .iter()
                .map(|r| r.weight * integral.sum(x + r.x, y + r.y, r.width, r.height) as f64)
                .sum();

            idx = if value < node.threshold * norm {
                node.left
            } else {
                node.right
            };
            if idx <= 0 {
                return classifier.leaves[(-idx) as usize];
            }
        }
    }

    /// Collect raw window hits over the whole scale pyramid
    fn raw_hits(&self, image: &GrayImage, params: &DetectionParams) -> Vec<FaceBox> {
        let (width, height) = image.dimensions();
        let mut hits = Vec::new();
        let mut factor = 1.0f64;

        loop {
            let window_w = (self.window_width as f64 * factor).round() as u32;
            let window_h = (self.window_height as f64 * factor).round() as u32;
            let scaled_w = (width as f64 / factor).round() as u32;
            let scaled_h = (height as f64 / factor).round() as u32;

            if scaled_w < self.window_width || scaled_h < self.window_height {
                break;
            }
            if window_w > width || window_h > height {
                break;
            }

            if window_w >= params.min_size.0 && window_h >= params.min_size.1 {
                let level = if factor == 1.0 {
                    IntegralImage::new(image)
                } else {
                    IntegralImage::new(&imageops::resize(
                        image,
                        scaled_w,
                        scaled_h,
                        FilterType::Triangle,
                    ))
                };

                let step = if factor > 2.0 { 1 } else { 2 };
                let before = hits.len();

                let mut y = 0;
                while y + self.window_height <= scaled_h {
                    let mut x = 0;
                    while x + self.window_width <= scaled_w {
                        if self.classify(&level, x, y) {
                            hits.push(FaceBox::new(
                                (x as f64 * factor).round() as i32,
                                (y as f64 * factor).round() as i32,
                                window_w as i32,
                                window_h as i32,
                            ));
                        }
                        x += step;
                    }
                    y += step;
                }

                trace!(factor, window_w, hits = hits.len() - before, "Scanned pyramid level");
            }

            factor *= params.scale_factor;
        }

        hits
    }
}

impl FaceDetector for HaarCascade {
    fn detect(
        &self,
        image: &GrayImage,
        params: &DetectionParams,
    ) -> Result<Vec<FaceBox>, DetectorError> {
        if params.scale_factor <= 1.0 {
            return Err(DetectorError::DetectFailed(format!(
                "scale factor must be greater than 1, got {}",
                params.scale_factor
            )));
        }

        let start = std::time::Instant::now();
        let hits = self.raw_hits(image, params);
        let raw = hits.len();
        let faces = group_rectangles(hits, params.min_neighbors, GROUP_EPS);

        debug!(
            raw,
            faces = faces.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Face detection complete"
        );
        Ok(faces)
    }
}

/// Summed-area tables of pixel values and squared pixel values
struct IntegralImage {
    stride: usize,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl IntegralImage {
    fn new(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let stride = width as usize + 1;
        let mut sum = vec![0u64; stride * (height as usize + 1)];
        let mut sq_sum = vec![0u64; stride * (height as usize + 1)];

        for y in 0..height as usize {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..width as usize {
                let v = image.get_pixel(x as u32, y as u32)[0] as u64;
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }

        Self {
            stride,
            sum,
            sq_sum,
        }
    }

    fn rect(table: &[u64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }

    fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::rect(&self.sum, self.stride, x, y, w, h)
    }

    fn sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::rect(&self.sq_sum, self.stride, x, y, w, h)
    }
}

fn similar(a: &FaceBox, b: &FaceBox, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    ((a.x - b.x).abs() as f64) <= delta
        && ((a.y - b.y).abs() as f64) <= delta
        && ((a.right() - b.right()).abs() as f64) <= delta
        && ((a.bottom() - b.bottom()).abs() as f64) <= delta
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Merge overlapping raw hits into one box per face
///
/// Hits are clustered by similarity; a cluster needs more than
/// `min_neighbors` members to survive and is reported as the mean of its
/// members. A surviving cluster that sits inside a stronger one is dropped.
pub fn group_rectangles(hits: Vec<FaceBox>, min_neighbors: u32, eps: f64) -> Vec<FaceBox> {
    if min_neighbors == 0 || hits.is_empty() {
        return hits;
    }

    let n = hits.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&hits[i], &hits[j], eps) {
                let (ri, rj) = (find_root(&mut parent, i), find_root(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    // Cluster index in order of first appearance
    let mut class_of_root = vec![usize::MAX; n];
    let mut totals: Vec<(i64, i64, i64, i64, u32)> = Vec::new();
    for (i, hit) in hits.iter().enumerate() {
        let root = find_root(&mut parent, i);
        if class_of_root[root] == usize::MAX {
            class_of_root[root] = totals.len();
            totals.push((0, 0, 0, 0, 0));
        }
        let t = &mut totals[class_of_root[root]];
        t.0 += hit.x as i64;
        t.1 += hit.y as i64;
        t.2 += hit.width as i64;
        t.3 += hit.height as i64;
        t.4 += 1;
    }

    let clusters: Vec<(FaceBox, u32)> = totals
        .iter()
        .map(|&(x, y, w, h, count)| {
            let s = 1.0 / count as f64;
            (
                FaceBox::new(
                    (x as f64 * s).round() as i32,
                    (y as f64 * s).round() as i32,
                    (w as f64 * s).round() as i32,
                    (h as f64 * s).round() as i32,
                ),
                count,
            )
        })
        .collect();

    let mut faces = Vec::new();
    for (i, &(r1, n1)) in clusters.iter().enumerate() {
        if n1 <= min_neighbors {
            continue;
        }

        let nested = clusters.iter().enumerate().any(|(j, &(r2, n2))| {
            if i == j || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i32;
            let dy = (r2.height as f64 * eps).round() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.right() <= r2.right() + dx
                && r1.bottom() <= r2.bottom() + dy
                && (n2 > n1.max(3) || n1 < 3)
        });

        if !nested {
            faces.push(r1);
        }
    }

    faces
}

fn invalid(msg: impl Into<String>) -> DetectorError {
    DetectorError::InvalidCascade(msg.into())
}

fn child<'a, 'input>(
    node: &roxmltree::Node<'a, 'input>,
    name: &str,
) -> Result<roxmltree::Node<'a, 'input>, DetectorError> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .ok_or_else(|| invalid(format!("missing <{}> in <{}>", name, node.tag_name().name())))
}

fn child_text<'a>(node: &roxmltree::Node<'a, '_>, name: &str) -> Result<&'a str, DetectorError> {
    Ok(child(node, name)?.text().unwrap_or("").trim())
}

/// List entries (`<_>` children) of a sequence node
fn items<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> {
    node.children()
        .filter(|n| n.is_element() && n.tag_name().name() == "_")
}

fn parse_value<T: std::str::FromStr>(text: &str) -> Result<T, DetectorError> {
    text.trim()
        .parse()
        .map_err(|_| invalid(format!("bad number '{}'", text.trim())))
}

fn parse_numbers(text: &str) -> Result<Vec<f64>, DetectorError> {
    text.split_whitespace().map(parse_value::<f64>).collect()
}

fn parse_feature(
    node: &roxmltree::Node<'_, '_>,
    window_width: u32,
    window_height: u32,
) -> Result<HaarFeature, DetectorError> {
    if let Ok(tilted) = child_text(node, "tilted")
        && tilted != "0"
    {
        return Err(invalid("tilted features are not supported"));
    }

    let rects = items(child(node, "rects")?)
        .map(|rect| {
            let values = parse_numbers(rect.text().unwrap_or(""))?;
            let &[x, y, w, h, weight] = values.as_slice() else {
                return Err(invalid(format!("rect needs 5 values, got {}", values.len())));
            };
            if x < 0.0 || y < 0.0 || w <= 0.0 || h <= 0.0 {
                return Err(invalid("rect with negative origin or empty size"));
            }
            let r = WeightedRect {
                x: x as u32,
                y: y as u32,
                width: w as u32,
                height: h as u32,
                weight,
            };
            if r.x + r.width > window_width || r.y + r.height > window_height {
                return Err(invalid("rect outside the detector window"));
            }
            Ok(r)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if rects.is_empty() {
        return Err(invalid("feature without rects"));
    }
    Ok(HaarFeature { rects })
}

fn parse_stage(
    node: &roxmltree::Node<'_, '_>,
    feature_count: usize,
) -> Result<Stage, DetectorError> {
    let threshold: f64 = parse_value(child_text(node, "stageThreshold")?)?;

    let classifiers = items(child(node, "weakClassifiers")?)
        .map(|weak| {
            let raw_nodes = parse_numbers(child_text(&weak, "internalNodes")?)?;
            let leaves = parse_numbers(child_text(&weak, "leafValues")?)?;

            if raw_nodes.is_empty() || raw_nodes.len() % 4 != 0 {
                return Err(invalid("internalNodes must hold groups of 4 values"));
            }
            let nodes: Vec<TreeNode> = raw_nodes
                .chunks_exact(4)
                .map(|c| TreeNode {
                    left: c[0] as i32,
                    right: c[1] as i32,
                    feature: c[2] as usize,
                    threshold: c[3],
                })
                .collect();

            if leaves.len() != nodes.len() + 1 {
                return Err(invalid(format!(
                    "{} nodes need {} leaves, got {}",
                    nodes.len(),
                    nodes.len() + 1,
                    leaves.len()
                )));
            }
            for tree_node in &nodes {
                if tree_node.feature >= feature_count {
                    return Err(invalid(format!(
                        "feature index {} out of range",
                        tree_node.feature
                    )));
                }
                for next in [tree_node.left, tree_node.right] {
                    let in_range = if next > 0 {
                        (next as usize) < nodes.len()
                    } else {
                        ((-next) as usize) < leaves.len()
                    };
                    if !in_range {
                        return Err(invalid(format!("node link {} out of range", next)));
                    }
                }
            }

            Ok(WeakClassifier { nodes, leaves })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stage {
        threshold,
        classifiers,
    })
}
