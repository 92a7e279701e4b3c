// Cobalt - a minimal Vulkan forward renderer
//
// Two timelines drive the engine: updates tick at a fixed rate through a
// time-debt accumulator, while rendering runs once per event-loop
// iteration (vsync-throttled when the presentation mode is FIFO).

mod backend;
mod config;
mod error;
mod forward;
mod renderer;

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

use backend::model::{MeshData, ModelData};
use config::Config;
use renderer::Renderer;

fn main() -> Result<()> {
    let config = Config::load();

    init_logging();
    log::info!("Starting Cobalt renderer");
    log::info!("Window: {}x{}", config.window.width, config.window.height);
    log::info!(
        "Updates per second: {}, vsync: {}",
        config.engine.updates_per_second,
        config.engine.vsync_enabled
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, DemoLogic);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

// =============================================================================
// APPLICATION CONTRACT
// =============================================================================

/// Callback contract the engine drives: scene setup at startup, input
/// handling on each update tick, cleanup at shutdown
pub trait ApplicationLogic {
    fn initialize(&mut self, renderer: &mut Renderer) -> Result<()>;
    fn handle_input(&mut self, elapsed_nanos: u64);
    fn cleanup(&mut self);
}

/// Demo application: a single static triangle
struct DemoLogic;

impl ApplicationLogic for DemoLogic {
    fn initialize(&mut self, renderer: &mut Renderer) -> Result<()> {
        let corners = [
            glam::vec3(-0.5, -0.5, 0.0),
            glam::vec3(0.0, 0.5, 0.0),
            glam::vec3(0.5, -0.5, 0.0),
        ];
        let mesh = MeshData {
            positions: corners.iter().flat_map(|v| v.to_array()).collect(),
            texture_coordinates: None,
            indices: vec![0, 1, 2],
        };
        let model = ModelData {
            id: "triangle".to_string(),
            meshes: vec![mesh],
        };
        renderer.load_models(&[model])?;
        Ok(())
    }

    fn handle_input(&mut self, _elapsed_nanos: u64) {}

    fn cleanup(&mut self) {}
}

// =============================================================================
// UPDATE TIMING
// =============================================================================

/// Time-debt accumulator decoupling the update rate from the render rate.
/// Elapsed wall time converts into debt in units of the target period; one
/// update runs each time the debt reaches a whole step, so updates can
/// fall behind and catch up over subsequent iterations.
struct UpdateClock {
    period_nanos: f64,
    debt: f64,
}

impl UpdateClock {
    fn new(updates_per_second: u32) -> Self {
        Self {
            period_nanos: 1_000_000_000.0 / updates_per_second as f64,
            debt: 0.0,
        }
    }

    /// Returns true when an update step is due; the caller runs exactly one
    /// step per call that returns true
    fn advance(&mut self, elapsed_nanos: u64) -> bool {
        self.debt += elapsed_nanos as f64 / self.period_nanos;
        if self.debt >= 1.0 {
            self.debt -= 1.0;
            true
        } else {
            false
        }
    }
}

// =============================================================================
// EVENT LOOP
// =============================================================================

struct App<L: ApplicationLogic> {
    config: Config,
    logic: L,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    clock: UpdateClock,
    last_tick: Instant,
    last_update: Instant,
    is_minimized: bool,
}

impl<L: ApplicationLogic> App<L> {
    fn new(config: Config, logic: L) -> Self {
        let clock = UpdateClock::new(config.engine.updates_per_second.max(1));
        let now = Instant::now();
        Self {
            config,
            logic,
            window: None,
            renderer: None,
            clock,
            last_tick: now,
            last_update: now,
            is_minimized: false,
        }
    }

    /// One engine tick: account elapsed time, run a due update, render
    fn tick(&mut self) -> Result<()> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick);
        self.last_tick = now;

        if self.clock.advance(elapsed.as_nanos() as u64) {
            let since_update = now.duration_since(self.last_update);
            self.logic.handle_input(since_update.as_nanos() as u64);
            self.last_update = now;
        }

        if self.is_minimized {
            return Ok(());
        }

        if let (Some(renderer), Some(window)) = (self.renderer.as_mut(), self.window.as_ref()) {
            renderer.render(window)?;
        }
        Ok(())
    }
}

impl<L: ApplicationLogic> ApplicationHandler for App<L> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        let mut renderer = match Renderer::new(&self.config, &window) {
            Ok(r) => r,
            Err(e) => {
                log::error!("Failed to initialize Vulkan: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.logic.initialize(&mut renderer) {
            log::error!("Application initialization failed: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
        self.renderer = Some(renderer);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.is_minimized = size.width == 0 || size.height == 0;
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.tick() {
                    log::error!("Render error: {:?}", e);
                    event_loop.exit();
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(KeyCode::Escape) = event.physical_key {
                        log::info!("Escape pressed, exiting");
                        event_loop.exit();
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.logic.cleanup();
        // Dropping the renderer drains the queues and releases every GPU
        // resource in reverse creation order
        self.renderer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::UpdateClock;

    #[test]
    fn no_update_before_one_period() {
        let mut clock = UpdateClock::new(30);
        assert!(!clock.advance(10_000_000)); // 10ms < 33.3ms
        assert!(!clock.advance(10_000_000));
    }

    #[test]
    fn update_due_after_one_period() {
        let mut clock = UpdateClock::new(30);
        assert!(clock.advance(40_000_000)); // 40ms > 33.3ms
        assert!(!clock.advance(0));
    }

    #[test]
    fn debt_carries_across_iterations() {
        let mut clock = UpdateClock::new(30);
        // 100ms at 30 UPS is three periods; steps drain one per iteration
        assert!(clock.advance(100_000_000));
        assert!(clock.advance(0));
        assert!(clock.advance(0));
        assert!(!clock.advance(0));
    }

    #[test]
    fn fractional_debt_accumulates() {
        let mut clock = UpdateClock::new(2); // 500ms period
        assert!(!clock.advance(300_000_000));
        assert!(clock.advance(300_000_000));
        assert!(!clock.advance(0));
    }
}
