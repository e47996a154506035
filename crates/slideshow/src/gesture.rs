//! Horizontal swipe classification for press/release pairs.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swipe {
    Forward,
    Back,
    None,
}

/// State of one press → release cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwipeGesture {
    start_x: Option<f64>,
}

impl SwipeGesture {
    pub fn press(&mut self, x: f64) {
        self.start_x = Some(x);
    }

    pub fn is_pressed(&self) -> bool {
        self.start_x.is_some()
    }

    /// Classify the release and reset the gesture.
    ///
    /// A release without a recorded press is treated as a tap at the
    /// release point, so only the edge bands can trigger navigation.
    pub fn release(&mut self, x: f64, width: u32, fraction: f64) -> Swipe {
        let start_x = self.start_x.take().unwrap_or(x);
        classify(start_x, x, width, fraction)
    }

    pub fn reset(&mut self) {
        self.start_x = None;
    }
}

/// Forward when released in the right band or dragged right by at least the
/// band width; back for the mirror case on the left.
pub fn classify(start_x: f64, release_x: f64, width: u32, fraction: f64) -> Swipe {
    let width = f64::from(width);
    let band = width * fraction;
    if release_x >= width - band || release_x - start_x >= band {
        Swipe::Forward
    } else if release_x <= band || start_x - release_x >= band {
        Swipe::Back
    } else {
        Swipe::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 1000;

    #[test]
    fn release_in_right_band_goes_forward() {
        assert_eq!(classify(950.0, 950.0, W, 0.1), Swipe::Forward);
        assert_eq!(classify(500.0, 900.0, W, 0.1), Swipe::Forward);
    }

    #[test]
    fn release_in_left_band_goes_back() {
        assert_eq!(classify(50.0, 50.0, W, 0.1), Swipe::Back);
        assert_eq!(classify(120.0, 100.0, W, 0.1), Swipe::Back);
    }

    #[test]
    fn screen_edges_count_as_bands() {
        assert_eq!(classify(500.0, f64::from(W - 1), W, 0.1), Swipe::Forward);
        assert_eq!(classify(500.0, 0.0, W, 0.1), Swipe::Back);
        assert_eq!(classify(500.0, 900.0, W, 0.1), Swipe::Forward);
        assert_eq!(classify(500.0, 100.0, W, 0.1), Swipe::Back);
    }

    #[test]
    fn drag_distance_decides_in_the_middle() {
        assert_eq!(classify(300.0, 400.0, W, 0.1), Swipe::Forward);
        assert_eq!(classify(600.0, 500.0, W, 0.1), Swipe::Back);
        assert_eq!(classify(500.0, 599.0, W, 0.1), Swipe::None);
        assert_eq!(classify(500.0, 401.0, W, 0.1), Swipe::None);
    }

    #[test]
    fn center_tap_is_a_no_op() {
        let mut gesture = SwipeGesture::default();
        gesture.press(500.0);
        assert!(gesture.is_pressed());
        assert_eq!(gesture.release(505.0, W, 0.1), Swipe::None);
        assert!(!gesture.is_pressed());
    }

    #[test]
    fn release_without_press_uses_release_point() {
        let mut gesture = SwipeGesture::default();
        assert_eq!(gesture.release(980.0, W, 0.1), Swipe::Forward);
        assert_eq!(gesture.release(500.0, W, 0.1), Swipe::None);
    }
}
