/// Raw input forwarded by the window loop, in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f64, y: f64 },
    PointerUp { x: f64, y: f64 },
    Key(char),
    CloseRequested,
}

/// Axis-aligned screen rectangle; edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let left = f64::from(self.x);
        let top = f64::from(self.y);
        x >= left
            && x <= left + f64::from(self.width)
            && y >= top
            && y <= top + f64::from(self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_edges_are_inclusive() {
        let region = Region {
            x: 10,
            y: 10,
            width: 80,
            height: 30,
        };
        assert!(region.contains(10.0, 10.0));
        assert!(region.contains(90.0, 40.0));
        assert!(!region.contains(90.5, 20.0));
        assert!(!region.contains(50.0, 9.9));
    }
}
