//! Kiosk window: presents composed frames and reports touch, mouse and key input.

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use anyhow::{Result, anyhow};
use crossbeam_channel::Sender;
use softbuffer::{Context as SoftContext, Surface};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, MouseButton, TouchPhase, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoopProxy};
use winit::keyboard::Key;
use winit::window::{Fullscreen, Window, WindowId};

use super::Screen;
use super::raster::{self, Canvas, Color};
use crate::error::ScreenError;
use crate::events::{InputEvent, Region};

const CANCEL_POLL: Duration = Duration::from_millis(100);
const BUTTON_PADDING: f32 = 12.0;
const BUTTON_TEXT_PX: f32 = 36.0;

/// A composed frame in `0xAARRGGBB`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

#[derive(Debug, Clone)]
pub enum UserEvent {
    Present(Frame),
    Exit,
}

/// Render-thread side of the window: composes in software and ships
/// finished frames to the event loop.
pub struct WindowScreen {
    proxy: EventLoopProxy<UserEvent>,
    canvas: Canvas,
    font: FontArc,
}

impl WindowScreen {
    pub fn new(proxy: EventLoopProxy<UserEvent>, size: (u32, u32)) -> Result<Self, ScreenError> {
        let font = raster::load_font()?;
        Ok(Self {
            proxy,
            canvas: Canvas::new(size.0, size.1),
            font,
        })
    }

    fn message_scale(&self) -> PxScale {
        PxScale::from((self.canvas.height() as f32 / 14.0).max(16.0))
    }
}

impl Screen for WindowScreen {
    fn size(&self) -> (u32, u32) {
        (self.canvas.width(), self.canvas.height())
    }

    fn clear(&mut self) {
        self.canvas.clear();
    }

    fn show_picture(&mut self, path: &Path) -> Result<(), ScreenError> {
        let img = raster::load_picture(path)?;
        self.canvas.draw_image(&img);
        Ok(())
    }

    fn show_message(&mut self, text: &str) {
        let scale = self.message_scale();
        let width = self.canvas.width() as f32;
        let height = self.canvas.height() as f32;
        let lines = raster::wrap_text(text, &self.font, scale, width * 0.9);
        let scaled = self.font.as_scaled(scale);
        let line_height = scaled.ascent() - scaled.descent() + scaled.line_gap();
        let block = line_height * lines.len() as f32;
        let mut baseline = (height - block) / 2.0 + scaled.ascent();
        for line in &lines {
            let line_width = raster::measure_text(&self.font, line, scale);
            let left = ((width - line_width) / 2.0).max(0.0);
            self.canvas.draw_text(
                &self.font,
                line,
                Color::from_rgb(0xFFFFFF),
                left,
                baseline,
                scale,
            );
            baseline += line_height;
        }
    }

    fn show_button(&mut self, label: &str, origin: (i32, i32)) -> Region {
        let scale = PxScale::from(BUTTON_TEXT_PX);
        let scaled = self.font.as_scaled(scale);
        let text_width = raster::measure_text(&self.font, label, scale);
        let text_height = scaled.ascent() - scaled.descent();
        let region = Region {
            x: origin.0,
            y: origin.1,
            width: (text_width + 2.0 * BUTTON_PADDING).ceil() as u32,
            height: (text_height + 2.0 * BUTTON_PADDING).ceil() as u32,
        };
        let left = region.x as f32;
        let top = region.y as f32;
        self.canvas.fill_rect(
            left,
            top,
            left + region.width as f32,
            top + region.height as f32,
            Color::from_rgba(0x000000, 0.6),
        );
        self.canvas.stroke_rect(region, Color::from_rgb(0xFFFFFF));
        self.canvas.draw_text(
            &self.font,
            label,
            Color::from_rgb(0xFFFFFF),
            left + BUTTON_PADDING,
            top + BUTTON_PADDING + scaled.ascent(),
            scale,
        );
        region
    }

    fn apply(&mut self) -> Result<(), ScreenError> {
        let frame = Frame {
            width: self.canvas.width(),
            height: self.canvas.height(),
            pixels: self.canvas.pixels().to_vec(),
        };
        self.proxy
            .send_event(UserEvent::Present(frame))
            .map_err(|_| ScreenError::Closed)
    }

    fn teardown(&mut self) {
        if self.proxy.send_event(UserEvent::Exit).is_err() {
            debug!("window loop already stopped");
        }
    }
}

type WindowHandle = Arc<Window>;

/// Event-loop side of the window. Owns nothing but presentation state; every
/// input is forwarded to the render loop untouched apart from the coordinate
/// mapping into frame space.
pub struct WindowApp {
    fullscreen: bool,
    frame_size: (u32, u32),
    inputs: Sender<InputEvent>,
    cancel: CancellationToken,
    window: Option<WindowHandle>,
    context: Option<SoftContext<WindowHandle>>,
    surface: Option<Surface<WindowHandle, WindowHandle>>,
    frame: Option<Frame>,
    cursor: Option<PhysicalPosition<f64>>,
    failure: Option<anyhow::Error>,
}

impl WindowApp {
    pub fn new(
        fullscreen: bool,
        frame_size: (u32, u32),
        inputs: Sender<InputEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fullscreen,
            frame_size,
            inputs,
            cancel,
            window: None,
            context: None,
            surface: None,
            frame: None,
            cursor: None,
            failure: None,
        }
    }

    /// Error that stopped the event loop, if any.
    pub fn take_failure(&mut self) -> Option<anyhow::Error> {
        self.failure.take()
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.create_window(event_loop) {
            self.failure = Some(err);
            event_loop.exit();
        }
    }

    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let mut attrs = Window::default_attributes()
            .with_title("Photobooth slideshow")
            .with_inner_size(PhysicalSize::new(self.frame_size.0, self.frame_size.1));
        if self.fullscreen {
            attrs = attrs
                .with_decorations(false)
                .with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = event_loop.create_window(attrs)?;
        if self.fullscreen {
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            window.set_cursor_visible(false);
        }
        let window = WindowHandle::new(window);
        let context = SoftContext::new(window.clone())
            .map_err(|err| anyhow!("failed to create softbuffer context: {err}"))?;
        let surface = Surface::new(&context, window.clone())
            .map_err(|err| anyhow!("failed to create softbuffer surface: {err}"))?;
        self.context = Some(context);
        self.surface = Some(surface);
        self.handle_resize(window.inner_size());
        self.window = Some(window);
        Ok(())
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if let Some(surface) = self.surface.as_mut()
            && let (Some(width), Some(height)) = (
                NonZeroU32::new(size.width.max(1)),
                NonZeroU32::new(size.height.max(1)),
            )
            && let Err(err) = surface.resize(width, height)
        {
            warn!(error = %err, "failed to resize surface");
        }
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn render(&mut self) {
        let (Some(surface), Some(window)) = (self.surface.as_mut(), self.window.as_ref()) else {
            return;
        };
        let Some(frame) = self.frame.as_ref() else {
            return;
        };
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);
        match surface.buffer_mut() {
            Ok(mut buffer) => {
                scale_nearest(frame, &mut buffer, width, height);
                if let Err(err) = buffer.present() {
                    warn!(error = %err, "failed to present frame");
                }
            }
            Err(err) => warn!(error = %err, "surface buffer unavailable"),
        }
    }

    fn to_frame(&self, position: PhysicalPosition<f64>) -> (f64, f64) {
        let size = self
            .window
            .as_ref()
            .map(|window| window.inner_size())
            .unwrap_or(PhysicalSize::new(self.frame_size.0, self.frame_size.1));
        map_to_frame(position.x, position.y, (size.width, size.height), self.frame_size)
    }

    fn forward(&self, event: InputEvent) {
        if self.inputs.send(event).is_err() {
            debug!(?event, "render loop gone; input dropped");
        }
    }

    fn pointer(&self, position: PhysicalPosition<f64>, pressed: bool) {
        let (x, y) = self.to_frame(position);
        self.forward(if pressed {
            InputEvent::PointerDown { x, y }
        } else {
            InputEvent::PointerUp { x, y }
        });
    }
}

impl ApplicationHandler<UserEvent> for WindowApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        self.ensure_window(event_loop);
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::Present(frame) => {
                self.frame = Some(frame);
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
            UserEvent::Exit => event_loop.exit(),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.forward(InputEvent::CloseRequested);
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::RedrawRequested => self.render(),
            WindowEvent::CursorMoved { position, .. } => self.cursor = Some(position),
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                if let Some(position) = self.cursor {
                    self.pointer(position, state == ElementState::Pressed);
                }
            }
            WindowEvent::Touch(touch) => match touch.phase {
                TouchPhase::Started => self.pointer(touch.location, true),
                TouchPhase::Ended => self.pointer(touch.location, false),
                TouchPhase::Moved | TouchPhase::Cancelled => {}
            },
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                if let Key::Character(text) = &event.logical_key
                    && let Some(ch) = text.chars().next()
                {
                    self.forward(InputEvent::Key(ch));
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + CANCEL_POLL));
    }
}

/// Map a window position into frame coordinates.
fn map_to_frame(x: f64, y: f64, window: (u32, u32), frame: (u32, u32)) -> (f64, f64) {
    let sx = f64::from(frame.0) / f64::from(window.0.max(1));
    let sy = f64::from(frame.1) / f64::from(window.1.max(1));
    (x * sx, y * sy)
}

/// Stretch `frame` onto a `width` x `height` buffer.
fn scale_nearest(frame: &Frame, dst: &mut [u32], width: u32, height: u32) {
    if frame.width == width && frame.height == height && dst.len() == frame.pixels.len() {
        dst.copy_from_slice(&frame.pixels);
        return;
    }
    let src_w = frame.width.max(1) as u64;
    let src_h = frame.height.max(1) as u64;
    for y in 0..height {
        let sy = (y as u64 * src_h / height as u64) as u32;
        for x in 0..width {
            let sx = (x as u64 * src_w / width as u64) as u32;
            let Some(out) = dst.get_mut((y * width + x) as usize) else {
                return;
            };
            *out = frame
                .pixels
                .get((sy * frame.width + sx) as usize)
                .copied()
                .unwrap_or(raster::BACKGROUND);
        }
    }
}
