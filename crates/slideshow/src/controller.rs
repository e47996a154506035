//! Render loop of the slideshow.
//!
//! One thread owns the picture list, the rotation index and the removal
//! affordance. Input events and ingested identifiers arrive on channels and
//! are applied here between idle steps.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use booth_protocol::PictureId;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SlideshowSettings;
use crate::error::ScreenError;
use crate::events::{InputEvent, Region};
use crate::gesture::{Swipe, SwipeGesture};
use crate::pictures::{PictureList, is_supported_image};
use crate::screen::Screen;

/// Remove button shown over a freshly ingested picture.
#[derive(Debug, Clone)]
pub struct RemovalAffordance {
    pub target: PathBuf,
    pub region: Region,
    pub deadline: Instant,
}

pub struct SlideshowController<S: Screen> {
    screen: S,
    settings: SlideshowSettings,
    pictures: PictureList,
    /// Entry displayed by the next rotation step.
    index: usize,
    current: Option<PathBuf>,
    dwell_left: Duration,
    affordance: Option<RemovalAffordance>,
    gesture: SwipeGesture,
    quitting: bool,
    announced: Receiver<PictureId>,
    inputs: Receiver<InputEvent>,
    cancel: CancellationToken,
}

impl<S: Screen> SlideshowController<S> {
    pub fn new(
        screen: S,
        settings: SlideshowSettings,
        pictures: PictureList,
        ingest: Receiver<PictureId>,
        inputs: Receiver<InputEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let dwell_left = settings.dwell;
        Self {
            screen,
            settings,
            pictures,
            index: 0,
            current: None,
            dwell_left,
            affordance: None,
            gesture: SwipeGesture::default(),
            quitting: false,
            announced: ingest,
            inputs,
            cancel,
        }
    }

    pub fn pictures(&self) -> &PictureList {
        &self.pictures
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn affordance(&self) -> Option<&RemovalAffordance> {
        self.affordance.as_ref()
    }

    /// Time left before the next rotation.
    pub fn dwell_left(&self) -> Duration {
        self.dwell_left
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting
    }

    fn should_stop(&self) -> bool {
        self.quitting || self.cancel.is_cancelled()
    }

    /// Rotate until the quit key, a closed window, or cancellation. The
    /// screen is torn down on the way out.
    pub fn run(mut self) -> Result<(), ScreenError> {
        info!(
            dir = %self.settings.picture_dir.display(),
            pictures = self.pictures.len(),
            dwell = ?self.settings.dwell,
            "slideshow started"
        );
        let result = self.rotate();
        self.screen.teardown();
        info!("slideshow stopped");
        result
    }

    fn rotate(&mut self) -> Result<(), ScreenError> {
        self.display_next()?;
        while !self.should_stop() {
            self.step()?;
            if self.dwell_left.is_zero() && !self.should_stop() {
                self.display_next()?;
            }
        }
        Ok(())
    }

    /// Idle for one step: apply input as it arrives, then drain the ingest
    /// queue without blocking.
    pub fn step(&mut self) -> Result<(), ScreenError> {
        let started = Instant::now();
        self.wait_for_input(self.settings.tuning.idle_step)?;
        self.dwell_left = self.dwell_left.saturating_sub(started.elapsed());
        while !self.should_stop() {
            match self.announced.try_recv() {
                Ok(id) => self.ingest(id)?,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        Ok(())
    }

    fn wait_for_input(&mut self, timeout: Duration) -> Result<(), ScreenError> {
        match self.inputs.recv_timeout(timeout) {
            Ok(event) => self.handle_input(event)?,
            Err(RecvTimeoutError::Timeout) => return Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                debug!("input source closed");
                self.quitting = true;
                return Ok(());
            }
        }
        while !self.should_stop() {
            match self.inputs.try_recv() {
                Ok(event) => self.handle_input(event)?,
                Err(_) => break,
            }
        }
        Ok(())
    }

    /// Show the entry at the rotation index and advance it. Wrapping past
    /// the end optionally rebuilds the list from disk; an empty list shows
    /// the placeholder message.
    pub fn display_next(&mut self) -> Result<(), ScreenError> {
        self.dwell_left = self.settings.dwell;
        let attempts = self.pictures.len() + 1;
        for _ in 0..attempts {
            if self.index >= self.pictures.len() {
                self.index = 0;
                self.wrapped();
            }
            let Some(path) = self.pictures.get(self.index).map(|e| e.path.clone()) else {
                break;
            };
            self.index += 1;
            match self.present(&path) {
                Ok(()) => {
                    debug!(picture = %path.display(), index = self.index - 1, "displayed");
                    self.current = Some(path);
                    return Ok(());
                }
                Err(ScreenError::Picture { path, source }) => {
                    warn!(picture = %path.display(), error = %source, "skipping undecodable picture");
                }
                Err(err) => return Err(err),
            }
        }
        self.current = None;
        self.screen.clear();
        self.screen.show_message(&self.settings.tuning.empty_message);
        self.screen.apply()
    }

    fn wrapped(&mut self) {
        if !self.settings.tuning.rescan_on_wrap {
            return;
        }
        match PictureList::scan(&self.settings.picture_dir, self.settings.tuning.recursive) {
            Ok(list) => {
                debug!(before = self.pictures.len(), after = list.len(), "rescanned on wrap");
                self.pictures = list;
            }
            Err(err) => warn!(error = %err, "rescan failed; keeping current list"),
        }
    }

    fn present(&mut self, path: &Path) -> Result<(), ScreenError> {
        self.screen.clear();
        self.screen.show_picture(path)?;
        self.screen.apply()
    }

    /// Step back so the entry before the one on screen is shown next.
    fn rewind(&mut self) {
        let len = self.pictures.len();
        if len == 0 {
            return;
        }
        let shown = self
            .current
            .as_deref()
            .and_then(|path| self.pictures.position(path))
            .unwrap_or(self.index % len);
        self.index = (shown + len - 1) % len;
    }

    /// Add an announced picture, show it with the remove button for the
    /// removal window, then go back to what was on screen before.
    pub fn ingest(&mut self, id: PictureId) -> Result<(), ScreenError> {
        let path = id.resolve(&self.settings.picture_dir);
        if !path.is_file() || !is_supported_image(&path) {
            debug!(%id, "announced picture not found; ignored");
            return Ok(());
        }
        match self.pictures.insert(path.clone()) {
            Ok(at) => {
                if at < self.index {
                    self.index += 1;
                }
                info!(%id, position = at, "picture added");
            }
            Err(at) => debug!(%id, position = at, "picture already listed"),
        }

        let previous = self.current.clone();
        self.screen.clear();
        if let Err(err) = self.screen.show_picture(&path) {
            return match err {
                ScreenError::Picture { source, .. } => {
                    warn!(%id, error = %source, "announced picture is not displayable");
                    Ok(())
                }
                other => Err(other),
            };
        }
        let origin = self.settings.tuning.remove_origin;
        let region = self
            .screen
            .show_button(&self.settings.tuning.remove_label, (origin[0], origin[1]));
        self.screen.apply()?;
        self.current = Some(path.clone());
        self.gesture.reset();
        self.affordance = Some(RemovalAffordance {
            target: path,
            region,
            deadline: Instant::now() + self.settings.tuning.removal_window,
        });

        self.hold_removal_window()?;
        self.affordance = None;
        if self.should_stop() {
            return Ok(());
        }
        self.restore(previous)
    }

    /// Poll input until the affordance expires or is used. The dwell timer
    /// and the ingest queue wait meanwhile.
    fn hold_removal_window(&mut self) -> Result<(), ScreenError> {
        while !self.should_stop() {
            let Some(deadline) = self.affordance.as_ref().map(|a| a.deadline) else {
                break;
            };
            let now = Instant::now();
            if now >= deadline {
                debug!("removal window elapsed");
                break;
            }
            let wait = (deadline - now).min(self.settings.tuning.idle_step);
            self.wait_for_input(wait)?;
        }
        Ok(())
    }

    fn restore(&mut self, previous: Option<PathBuf>) -> Result<(), ScreenError> {
        let target = previous
            .filter(|path| self.pictures.position(path).is_some())
            .or_else(|| {
                self.current
                    .clone()
                    .filter(|path| self.pictures.position(path).is_some())
            });
        let Some(path) = target else {
            return self.display_next();
        };
        match self.present(&path) {
            Ok(()) => {
                self.current = Some(path);
                Ok(())
            }
            Err(ScreenError::Picture { source, .. }) => {
                warn!(picture = %path.display(), error = %source, "cannot restore picture");
                self.display_next()
            }
            Err(err) => Err(err),
        }
    }

    pub fn handle_input(&mut self, event: InputEvent) -> Result<(), ScreenError> {
        match event {
            InputEvent::PointerDown { x, .. } => self.gesture.press(x),
            InputEvent::PointerUp { x, y } => {
                if let Some(affordance) = self.affordance.as_ref() {
                    self.gesture.reset();
                    if affordance.region.contains(x, y) {
                        let target = affordance.target.clone();
                        self.remove_picture(&target);
                        self.affordance = None;
                    }
                    return Ok(());
                }
                let (width, _) = self.screen.size();
                match self
                    .gesture
                    .release(x, width, self.settings.tuning.swipe_fraction)
                {
                    Swipe::Forward => {
                        debug!("swipe forward");
                        self.display_next()?;
                    }
                    Swipe::Back => {
                        debug!("swipe back");
                        self.rewind();
                        self.display_next()?;
                    }
                    Swipe::None => {}
                }
            }
            InputEvent::Key(key) if key == self.settings.tuning.quit_key => {
                info!("quit key pressed");
                self.quitting = true;
            }
            InputEvent::Key(_) => {}
            InputEvent::CloseRequested => {
                info!("window closed");
                self.quitting = true;
            }
        }
        Ok(())
    }

    fn remove_picture(&mut self, target: &Path) {
        match fs::remove_file(target) {
            Ok(()) => info!(picture = %target.display(), "picture deleted"),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(picture = %target.display(), "picture already gone");
            }
            Err(err) => {
                warn!(picture = %target.display(), error = %err, "failed to delete picture");
                return;
            }
        }
        if let Some(at) = self.pictures.remove(target)
            && at < self.index
        {
            self.index -= 1;
        }
        if self.current.as_deref() == Some(target) {
            self.current = None;
        }
    }
}
