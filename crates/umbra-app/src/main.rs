// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};
use umbra_core::{init_tracing, GameClock, GameTime};
use umbra_math::FirstPersonCamera;
use umbra_platform::InputTracker;
use umbra_render::{
    AssetPaths, FrameStatus, RenderSize, Renderer, Scene, SceneAssets, VsyncMode,
};
use umbra_render_vk::VkRenderer;

use umbra_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

mod config;
mod pacing;

use config::AppConfig;
use pacing::Pacing;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; missing means defaults
    #[arg(long, default_value = "umbra.toml")]
    config: PathBuf,
    /// OBJ model to draw (built-in cube when omitted)
    #[arg(long)]
    model: Option<PathBuf>,
    /// Surface texture for the model
    #[arg(long)]
    texture: Option<PathBuf>,
    /// Image cast by the projector
    #[arg(long)]
    projected_texture: Option<PathBuf>,
    /// Upper bound on MSAA samples
    #[arg(long)]
    msaa: Option<u32>,
    /// Enable the Khronos validation layer
    #[arg(long)]
    validation: bool,
    /// Exit after this many presented frames
    #[arg(long)]
    frames: Option<u64>,
}

struct App {
    args: Args,
    cfg: AppConfig,

    // Renderer before window: the surface must go first.
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    render_size: RenderSize,
    pacing: Pacing,
    vsync_mode: VsyncMode,

    input: InputTracker,
    clock: GameClock,
    time: GameTime,

    presented: u64,
    frames: u32,
    last_fps_instant: Instant,

    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(args: Args, cfg: AppConfig) -> Self {
        Self {
            args,
            cfg,
            renderer: None,
            window: None,
            render_size: RenderSize::new(1, 1),
            pacing: Pacing::default(),
            vsync_mode: VsyncMode::default(),
            input: InputTracker::new(),
            clock: GameClock::new(),
            time: GameTime::default(),
            presented: 0,
            frames: 0,
            last_fps_instant: Instant::now(),
            fatal: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let r = &self.cfg.render;
        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_title("umbra")
                    .with_inner_size(PhysicalSize::new(r.window_width, r.window_height)),
            )
            .context("create_window")?;
        let size = window.inner_size();
        self.render_size = RenderSize::new(size.width, size.height);
        self.pacing = Pacing::new(self.render_size);

        let mut settings = self.cfg.render_settings();
        if let Some(msaa) = self.args.msaa {
            settings.msaa_samples = msaa.max(1);
        }
        settings.validation |= self.args.validation;

        let assets = SceneAssets::load(&AssetPaths {
            model: self.args.model.clone(),
            texture: self.args.texture.clone(),
            projected_texture: self.args.projected_texture.clone(),
        })
        .context("loading scene assets")?;
        let aspect = self.render_size.aspect();
        let scene = Scene {
            assets,
            camera: Box::new(FirstPersonCamera::new(aspect, self.cfg.camera_rates())),
            projector: self.cfg.projector(aspect),
        };

        let mut renderer = VkRenderer::new(&window, &window, self.render_size, &settings, scene)
            .context("renderer init")?;
        info!("backend = vk ({})", renderer.device_name());
        renderer.set_clear_color(settings.clear_color);
        renderer.set_vsync_mode(settings.vsync_mode);
        self.vsync_mode = settings.vsync_mode;

        self.clock.reset();
        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    /// Reported from `main` once the event loop has returned.
    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        self.fatal = Some(e);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let Some(renderer) = &mut self.renderer else {
            return Ok(());
        };
        self.clock.update_game_time(&mut self.time);
        let status = renderer.render(&self.time, &self.input.state())?;
        self.pacing.frame_finished(status);
        match status {
            FrameStatus::Presented => {
                self.presented += 1;
                self.frames = self.frames.saturating_add(1);
            }
            FrameStatus::Skipped => debug!("surface has no extent; waiting for a resize"),
            FrameStatus::Recreated => {}
        }
        if self.args.frames.is_some_and(|n| self.presented >= n) {
            info!(
                "{} frames presented ({} submitted); exiting",
                self.presented,
                renderer.frame_number()
            );
            self.shutdown(event_loop);
        }
        Ok(())
    }

    fn apply_hotkey(&mut self, key: Hotkey) {
        let Some(renderer) = &mut self.renderer else {
            return;
        };
        match key {
            Hotkey::ResetProjector => {
                info!("projector reset");
                renderer.projector_mut().reset();
            }
            Hotkey::ToggleVsync => {
                self.vsync_mode = toggled(self.vsync_mode);
                info!("vsync mode → {:?}", self.vsync_mode);
                renderer.set_vsync_mode(self.vsync_mode);
            }
        }
    }

    fn request_redraw(&self) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }
}

/// One-shot keys; held movement keys go through `InputTracker`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Hotkey {
    ResetProjector,
    ToggleVsync,
}

fn hotkey(event: &KeyEvent) -> Option<Hotkey> {
    if event.state != ElementState::Pressed || event.repeat {
        return None;
    }
    match event.physical_key {
        PhysicalKey::Code(code) => hotkey_for(code),
        PhysicalKey::Unidentified(_) => None,
    }
}

fn hotkey_for(code: KeyCode) -> Option<Hotkey> {
    match code {
        KeyCode::KeyR => Some(Hotkey::ResetProjector),
        KeyCode::KeyV => Some(Hotkey::ToggleVsync),
        _ => None,
    }
}

fn toggled(mode: VsyncMode) -> VsyncMode {
    match mode {
        VsyncMode::Fifo => VsyncMode::Mailbox,
        VsyncMode::Mailbox => VsyncMode::Fifo,
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(self.pacing.control_flow());
        info!("resumed → paused={}", self.pacing.is_paused());
        if !self.pacing.is_paused() {
            self.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }
        self.input.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = RenderSize::new(new_size.width, new_size.height);
                let resume = self.pacing.resized(self.render_size);
                info!(
                    "Resized → {}x{} (paused={})",
                    self.render_size.width,
                    self.render_size.height,
                    self.pacing.is_paused()
                );
                if let Some(renderer) = &mut self.renderer {
                    if let Err(e) = renderer.resize(self.render_size) {
                        self.fail(event_loop, e);
                        return;
                    }
                }
                if resume {
                    self.request_redraw();
                }
            }

            WindowEvent::Occluded(occluded) => {
                if self.pacing.occluded(occluded) {
                    self.request_redraw();
                }
                info!("Occluded={} → paused={}", occluded, self.pacing.is_paused());
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let Some(key) = hotkey(&event) {
                    self.apply_hotkey(key);
                }
            }

            WindowEvent::RedrawRequested => {
                if self.pacing.is_paused() {
                    return;
                }
                if let Err(e) = self.redraw(event_loop) {
                    self.fail(event_loop, e);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(self.pacing.control_flow());
        if self.pacing.is_paused() {
            // Nothing to draw into; sleep until the window system wakes us.
            self.frames = 0;
            return;
        }
        self.request_redraw();

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn run(args: Args) -> Result<()> {
    let cfg = AppConfig::load_or_default(&args.config);
    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(args, cfg);
    event_loop.run_app(&mut app)?;
    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    init_tracing();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e:#}");
            eprintln!("umbra: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hotkeys_map_r_and_v() {
        assert_eq!(hotkey_for(KeyCode::KeyR), Some(Hotkey::ResetProjector));
        assert_eq!(hotkey_for(KeyCode::KeyV), Some(Hotkey::ToggleVsync));
        // Movement keys belong to the input tracker.
        assert_eq!(hotkey_for(KeyCode::KeyW), None);
        assert_eq!(hotkey_for(KeyCode::ArrowUp), None);
    }

    #[test]
    fn vsync_toggle_alternates() {
        assert_eq!(toggled(VsyncMode::Mailbox), VsyncMode::Fifo);
        assert_eq!(toggled(toggled(VsyncMode::Fifo)), VsyncMode::Fifo);
    }

    #[test]
    fn cli_overrides_parse() {
        let args = Args::try_parse_from(["umbra", "--msaa", "4", "--frames", "10", "--validation"])
            .unwrap();
        assert_eq!(args.msaa, Some(4));
        assert_eq!(args.frames, Some(10));
        assert!(args.validation);
        assert_eq!(args.config, PathBuf::from("umbra.toml"));
    }
}
