//! Scene coordinates. The y axis grows downwards, as on screen.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// A position or direction on the scene.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn dot(self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn distance(self, other: Point) -> f64 {
        let d = self - other;
        d.dot(d).sqrt()
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, k: f64) -> Point {
        Point::new(self.x * k, self.y * k)
    }
}

/// Direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heading {
    North,
    South,
    East,
    West,
}

impl Heading {
    pub const ALL: [Heading; 4] = [Heading::North, Heading::South, Heading::East, Heading::West];

    /// Unit vector in scene coordinates.
    pub fn unit(self) -> Point {
        match self {
            Heading::North => Point::new(0.0, -1.0),
            Heading::South => Point::new(0.0, 1.0),
            Heading::East => Point::new(1.0, 0.0),
            Heading::West => Point::new(-1.0, 0.0),
        }
    }

    /// Heading after a right turn.
    pub fn right(self) -> Heading {
        match self {
            Heading::North => Heading::East,
            Heading::East => Heading::South,
            Heading::South => Heading::West,
            Heading::West => Heading::North,
        }
    }

    /// Heading after a left turn.
    pub fn left(self) -> Heading {
        self.right().reverse()
    }

    pub fn reverse(self) -> Heading {
        match self {
            Heading::North => Heading::South,
            Heading::South => Heading::North,
            Heading::East => Heading::West,
            Heading::West => Heading::East,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Heading::East | Heading::West)
    }
}

impl fmt::Display for Heading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Local frame of an intersection approach: `along` is measured in the
/// direction of travel from the centre, `lateral` to the driver's right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub center: Point,
    pub heading: Heading,
}

impl Frame {
    pub fn new(center: Point, heading: Heading) -> Self {
        Self { center, heading }
    }

    pub fn along(&self, p: Point) -> f64 {
        (p - self.center).dot(self.heading.unit())
    }

    pub fn lateral(&self, p: Point) -> f64 {
        (p - self.center).dot(self.heading.right().unit())
    }

    pub fn to_scene(&self, along: f64, lateral: f64) -> Point {
        self.center + self.heading.unit() * along + self.heading.right().unit() * lateral
    }
}
