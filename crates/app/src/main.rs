//! Deferred Renderer - Main Entry Point
//!
//! Loads an OBJ model and renders it through a two-subpass deferred
//! pipeline with an egui control overlay.
//!
//! Usage: deferred-renderer <model.obj> [texture.png]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use deferred_platform::Window;
use deferred_renderer::{Renderer, RendererConfig};

const WINDOW_WIDTH: u32 = 1920;
const WINDOW_HEIGHT: u32 = 1080;
const WINDOW_TITLE: &str = "Deferred Renderer";

struct App {
    config: RendererConfig,
    window: Option<Window>,
    renderer: Option<Renderer>,
    fatal: bool,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            fatal: false,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            match Window::new(event_loop, WINDOW_WIDTH, WINDOW_HEIGHT, WINDOW_TITLE) {
                Ok(window) => match Renderer::new(&window, &self.config) {
                    Ok(renderer) => {
                        info!("Initialization complete, entering main loop");
                        self.renderer = Some(renderer);
                        self.window = Some(window);
                    }
                    Err(e) => {
                        error!("Failed to create renderer: {:?}", e);
                        self.fatal = true;
                        event_loop.exit();
                    }
                },
                Err(e) => {
                    error!("Failed to create window: {}", e);
                    self.fatal = true;
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // The overlay gets first look; a consumed event stops here.
        if let (Some(window), Some(renderer)) = (&self.window, &mut self.renderer) {
            if renderer.on_window_event(window, &event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                if let Some(ref mut renderer) = self.renderer {
                    renderer.note_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                if let (Some(window), Some(renderer)) = (&self.window, &mut self.renderer) {
                    if let Err(e) = renderer.render_frame(window) {
                        error!("Render error: {:?}", e);
                        self.fatal = true;
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
}

fn parse_args() -> Result<RendererConfig> {
    let mut args = std::env::args().skip(1);
    let model_path = match args.next() {
        Some(p) => PathBuf::from(p),
        None => bail!("usage: deferred-renderer <model.obj> [texture.png]"),
    };
    let texture_path = args.next().map(PathBuf::from);

    Ok(RendererConfig {
        model_path,
        texture_path,
        shader_dir: PathBuf::from("shaders"),
        enable_validation: cfg!(debug_assertions),
    })
}

fn main() -> Result<ExitCode> {
    deferred_core::init_logging();

    let config = parse_args()?;
    info!("Starting deferred renderer with model {:?}", config.model_path);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if app.fatal {
        return Ok(ExitCode::FAILURE);
    }
    info!("Clean shutdown");
    Ok(ExitCode::SUCCESS)
}
