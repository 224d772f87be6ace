//! Ink strokes
//!
//! Only the fields needed to move a stroke between devices are modelled:
//! pen kind, size, colour, bounding box and the sampled points.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Pen used to draw a stroke
///
/// Serialized by its upper-case name, which is also how it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Pen {
    #[serde(rename = "BALLPEN")]
    Ballpen,
    #[serde(rename = "REDBALLPEN")]
    RedBallpen,
    #[serde(rename = "GREENBALLPEN")]
    GreenBallpen,
    #[serde(rename = "BLUEBALLPEN")]
    BlueBallpen,
    Pencil,
    Brush,
    Marker,
    Fountain,
    Dashed,
}

impl Pen {
    pub const ALL: [Pen; 9] = [
        Pen::Ballpen,
        Pen::RedBallpen,
        Pen::GreenBallpen,
        Pen::BlueBallpen,
        Pen::Pencil,
        Pen::Brush,
        Pen::Marker,
        Pen::Fountain,
        Pen::Dashed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Pen::Ballpen => "BALLPEN",
            Pen::RedBallpen => "REDBALLPEN",
            Pen::GreenBallpen => "GREENBALLPEN",
            Pen::BlueBallpen => "BLUEBALLPEN",
            Pen::Pencil => "PENCIL",
            Pen::Brush => "BRUSH",
            Pen::Marker => "MARKER",
            Pen::Fountain => "FOUNTAIN",
            Pen::Dashed => "DASHED",
        }
    }
}

impl Display for Pen {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Pen {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pen::ALL
            .iter()
            .copied()
            .find(|pen| pen.name() == s)
            .ok_or_else(|| DomainError::UnknownPen(s.to_string()))
    }
}

/// One sampled point of a stroke
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
    pub pressure: f32,
    pub size: f32,
    pub tilt_x: i32,
    pub tilt_y: i32,
    /// Sample time in epoch milliseconds
    pub timestamp: i64,
}

/// A stroke drawn on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: String,
    pub page_id: String,
    pub size: f32,
    pub pen: Pen,
    /// ARGB colour packed into an int
    pub color: i32,
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
    pub points: Vec<StrokePoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Stroke {
    /// Field-by-field comparison; timestamps at second precision
    pub fn same_content(&self, other: &Stroke) -> bool {
        self.id == other.id
            && self.page_id == other.page_id
            && self.size == other.size
            && self.pen == other.pen
            && self.color == other.color
            && self.top == other.top
            && self.bottom == other.bottom
            && self.left == other.left
            && self.right == other.right
            && self.points.len() == other.points.len()
            && self
                .points
                .iter()
                .zip(other.points.iter())
                .all(|(a, b)| {
                    a.x == b.x
                        && a.y == b.y
                        && a.pressure == b.pressure
                        && a.size == b.size
                        && a.tilt_x == b.tilt_x
                        && a.tilt_y == b.tilt_y
                        && a.timestamp == b.timestamp
                })
            && self.created_at.timestamp() == other.created_at.timestamp()
            && self.updated_at.timestamp() == other.updated_at.timestamp()
    }
}
