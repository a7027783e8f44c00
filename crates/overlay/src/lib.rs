//! Interactive debug overlay.
//!
//! Wraps egui: winit events go in, tessellated draw data comes out and
//! is recorded into the overlay render pass by the mesh backend in
//! [`renderer`]. The widgets are bound to [`OverlayParams`], which the
//! renderer reads when filling its uniform payload.

pub mod params;
pub mod renderer;

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use winit::event::WindowEvent;
use winit::window::Window;

use deferred_rhi::command::{CommandBuffer, CommandPool};
use deferred_rhi::device::Device;
use deferred_rhi::RhiResult;

pub use params::{DisplayMode, OverlayParams};
pub use renderer::MeshRenderer;

/// Output of one overlay UI pass, consumed by [`Overlay::paint`].
pub struct OverlayFrame {
    primitives: Vec<egui::ClippedPrimitive>,
    textures_delta: egui::TexturesDelta,
    pixels_per_point: f32,
}

/// The debug overlay: egui context, winit integration, and the Vulkan
/// mesh backend.
pub struct Overlay {
    context: egui::Context,
    state: egui_winit::State,
    renderer: MeshRenderer,
    /// Widget-bound parameters, read by the scene renderer each frame.
    pub params: OverlayParams,
}

impl Overlay {
    /// Creates the overlay against a compatible render pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh backend cannot be created.
    pub fn new(
        device: Arc<Device>,
        window: &Window,
        render_pass: vk::RenderPass,
        frame_count: usize,
        shader_dir: &Path,
        params: OverlayParams,
    ) -> RhiResult<Self> {
        let context = egui::Context::default();
        let state = egui_winit::State::new(
            context.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let renderer = MeshRenderer::new(device, render_pass, frame_count, shader_dir)?;

        Ok(Self {
            context,
            state,
            renderer,
            params,
        })
    }

    /// Feeds a window event to the overlay.
    ///
    /// Returns true when the overlay consumed the event and the
    /// application should not act on it.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.state.on_window_event(window, event).consumed
    }

    /// Runs the UI for this frame and returns the draw data.
    pub fn prepare_frame(&mut self, window: &Window) -> OverlayFrame {
        let input = self.state.take_egui_input(window);
        let params = &mut self.params;
        let full_output = self.context.run(input, |ctx| {
            build_ui(ctx, params);
        });
        self.state
            .handle_platform_output(window, full_output.platform_output);

        let primitives = self
            .context
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        OverlayFrame {
            primitives,
            textures_delta: full_output.textures_delta,
            pixels_per_point: full_output.pixels_per_point,
        }
    }

    /// Uploads this frame's texture deltas and records its draws.
    ///
    /// `cmd` must be inside the overlay render pass.
    ///
    /// # Errors
    ///
    /// Returns an error if a texture upload or buffer write fails.
    pub fn paint(
        &mut self,
        pool: &CommandPool,
        cmd: &CommandBuffer,
        frame: OverlayFrame,
        frame_index: usize,
        extent: vk::Extent2D,
    ) -> RhiResult<()> {
        self.renderer.update_textures(pool, &frame.textures_delta)?;
        self.renderer.record(
            cmd,
            frame_index,
            extent,
            frame.pixels_per_point,
            &frame.primitives,
        )
    }

    /// Rebuilds the mesh backend after a swapchain recreate.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline rebuild or a texture re-upload
    /// fails.
    pub fn rebuild(
        &mut self,
        pool: &CommandPool,
        render_pass: vk::RenderPass,
        frame_count: usize,
    ) -> RhiResult<()> {
        self.renderer.rebuild(pool, render_pass, frame_count)
    }
}

/// Declares the control widgets.
fn build_ui(ctx: &egui::Context, params: &mut OverlayParams) {
    egui::Window::new("Renderer Controls")
        .resizable(false)
        .show(ctx, |ui| {
            ui.heading("Camera");
            ui.add(egui::Slider::new(&mut params.zoom, 2.0..=50.0).text("Zoom"));
            ui.add(egui::Slider::new(&mut params.scale, 0.1..=10.0).text("Scale"));

            ui.separator();
            ui.heading("Stages");
            ui.checkbox(&mut params.model_stage, "Model transform");
            ui.checkbox(&mut params.texture_stage, "Texture sampling");
            ui.checkbox(&mut params.lighting_stage, "Lighting");

            ui.separator();
            ui.heading("Lighting Terms");
            ui.checkbox(&mut params.ambient, "Ambient");
            ui.checkbox(&mut params.diffuse, "Diffuse");
            ui.checkbox(&mut params.specular, "Specular");

            ui.separator();
            ui.heading("Material");
            ui.horizontal(|ui| {
                ui.color_edit_button_rgb(&mut params.ambient_color);
                ui.label("Ambient (Ka)");
            });
            ui.horizontal(|ui| {
                ui.color_edit_button_rgb(&mut params.diffuse_color);
                ui.label("Diffuse (Kd)");
            });
            ui.horizontal(|ui| {
                ui.color_edit_button_rgb(&mut params.specular_color);
                ui.label("Specular (Ks)");
            });
            ui.horizontal(|ui| {
                ui.color_edit_button_rgb(&mut params.emission_color);
                ui.label("Emission (Ke)");
            });
            ui.add(egui::Slider::new(&mut params.shininess, 0.0..=256.0).text("Shininess (Ns)"));

            ui.separator();
            ui.heading("Display");
            for mode in DisplayMode::ALL {
                ui.radio_value(&mut params.display_mode, mode, mode.label());
            }
        });
}
