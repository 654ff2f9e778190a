//! FOLD model format.
//!
//! A minimal reader for the FOLD JSON format. The key frame lives at the top
//! level and further frames live in `file_frames`. A frame with
//! `frame_inherit: true` takes every field it does not set from its
//! `frame_parent` (the key frame when absent); other frames stand alone.
//! Polygonal faces are fan-triangulated.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, SolverError};
use crate::solver::{FrameIndex, SolverModel};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct FrameData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    frame_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vertices_coords: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    faces_vertices: Option<Vec<Vec<u32>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    frame_parent: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    frame_inherit: Option<bool>,
}

impl FrameData {
    /// Fills unset fields from `parent`.
    fn inherit_from(&self, parent: &Self) -> Self {
        Self {
            frame_title: self.frame_title.clone().or_else(|| parent.frame_title.clone()),
            vertices_coords: self.vertices_coords.clone().or_else(|| parent.vertices_coords.clone()),
            faces_vertices: self.faces_vertices.clone().or_else(|| parent.faces_vertices.clone()),
            frame_parent: self.frame_parent,
            frame_inherit: self.frame_inherit,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FoldDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_creator: Option<String>,
    #[serde(flatten)]
    key_frame: FrameData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    file_frames: Vec<FrameData>,
}

/// One frame with inheritance resolved.
#[derive(Debug, Clone, Default, PartialEq)]
struct ResolvedFrame {
    title: Option<String>,
    /// `x y z` interleaved.
    coords: Vec<f32>,
    /// 3 indices per triangle.
    triangles: Vec<u32>,
    /// Structural problem found while resolving, reported at load time.
    issue: Option<String>,
}

#[allow(clippy::cast_possible_truncation)]
fn resolve_frame(frame: &FrameData) -> ResolvedFrame {
    let mut resolved = ResolvedFrame {
        title: frame.frame_title.clone(),
        ..ResolvedFrame::default()
    };

    let vertices = frame.vertices_coords.as_deref().unwrap_or_default();
    resolved.coords.reserve(vertices.len() * 3);
    for (i, vertex) in vertices.iter().enumerate() {
        match vertex.as_slice() {
            [x, y] => resolved.coords.extend([*x as f32, *y as f32, 0.0]),
            [x, y, z] => resolved.coords.extend([*x as f32, *y as f32, *z as f32]),
            other => {
                resolved.issue = Some(format!("vertex {i} has {} coordinates", other.len()));
                return resolved;
            }
        }
    }

    let vertex_count = vertices.len();
    let faces = frame.faces_vertices.as_deref().unwrap_or_default();
    for (i, face) in faces.iter().enumerate() {
        if face.len() < 3 {
            resolved.issue = Some(format!("face {i} has {} vertices", face.len()));
            return resolved;
        }
        if let Some(bad) = face.iter().find(|&&v| v as usize >= vertex_count) {
            resolved.issue = Some(format!(
                "face {i} references vertex {bad}, model has {vertex_count}"
            ));
            return resolved;
        }
        for k in 1..face.len() - 1 {
            resolved.triangles.extend([face[0], face[k], face[k + 1]]);
        }
    }

    resolved
}

/// A parsed FOLD model with every frame resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoldModel {
    creator: Option<String>,
    frames: Vec<ResolvedFrame>,
}

impl FoldModel {
    /// Parses FOLD JSON.
    pub fn parse(source: &[u8]) -> Result<Self, ParseError> {
        let document: FoldDocument = serde_json::from_slice(source)?;
        Ok(Self::from_document(&document))
    }

    fn from_document(document: &FoldDocument) -> Self {
        // Parents must precede their children, so one pass resolves every chain.
        let mut merged: Vec<FrameData> = Vec::with_capacity(1 + document.file_frames.len());
        let mut frames = Vec::with_capacity(1 + document.file_frames.len());
        merged.push(document.key_frame.clone());
        frames.push(resolve_frame(&document.key_frame));

        for frame in &document.file_frames {
            let index = merged.len();
            let (data, issue) = if frame.frame_inherit == Some(true) {
                let parent = frame.frame_parent.unwrap_or(0);
                match merged.get(parent) {
                    Some(base) => (frame.inherit_from(base), None),
                    None => (
                        frame.clone(),
                        Some(format!("frame {index} inherits from frame {parent}, which does not precede it")),
                    ),
                }
            } else {
                (frame.clone(), None)
            };

            let mut resolved = resolve_frame(&data);
            if issue.is_some() {
                resolved.issue = issue;
            }
            frames.push(resolved);
            merged.push(data);
        }

        Self {
            creator: document.file_creator.clone(),
            frames,
        }
    }

    /// The `file_creator` field, if present.
    #[must_use]
    pub fn creator(&self) -> Option<&str> {
        self.creator.as_deref()
    }

    /// The title of `frame`, if present.
    #[must_use]
    pub fn frame_title(&self, frame: FrameIndex) -> Option<&str> {
        self.frames.get(usize::from(frame))?.title.as_deref()
    }

    /// Checks that `frame` exists and is structurally sound.
    pub fn validate_frame(&self, frame: FrameIndex) -> Result<(), SolverError> {
        let resolved = self.frames.get(usize::from(frame)).ok_or(SolverError::NoSuchFrame {
            frame,
            frame_count: self.frame_count(),
        })?;
        match &resolved.issue {
            Some(reason) => Err(SolverError::InvalidModel { reason: reason.clone() }),
            None => Ok(()),
        }
    }

    fn frame(&self, frame: FrameIndex) -> Option<&ResolvedFrame> {
        self.frames
            .get(usize::from(frame))
            .filter(|resolved| resolved.issue.is_none())
    }
}

impl FromStr for FoldModel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.as_bytes())
    }
}

#[allow(clippy::cast_possible_truncation)]
impl SolverModel for FoldModel {
    fn frame_count(&self) -> FrameIndex {
        FrameIndex::try_from(self.frames.len()).unwrap_or(FrameIndex::MAX)
    }

    fn vertex_count(&self, frame: FrameIndex) -> u32 {
        self.frame(frame).map_or(0, |f| (f.coords.len() / 3) as u32)
    }

    fn static_vertex_coords(&self, frame: FrameIndex, out: &mut [f32]) -> usize {
        let Some(resolved) = self.frame(frame) else {
            return 0;
        };
        let n = resolved.coords.len().min(out.len());
        out[..n].copy_from_slice(&resolved.coords[..n]);
        n
    }

    fn face_count(&self, frame: FrameIndex) -> u32 {
        self.frame(frame).map_or(0, |f| (f.triangles.len() / 3) as u32)
    }

    fn face_indices(&self, frame: FrameIndex, out: &mut [u32]) -> usize {
        let Some(resolved) = self.frame(frame) else {
            return 0;
        };
        let n = resolved.triangles.len().min(out.len());
        out[..n].copy_from_slice(&resolved.triangles[..n]);
        n
    }
}
