//! Viewer application: meshes, sprites and a screen overlay.

use std::collections::HashSet;

use cadence_app::{AppContext, CadenceApp, FrameContext, VulkanDevice, WindowEvent};
use cadence_core::math::Rect;
use cadence_core::{Colour, CoordinateSpace};
use cadence_frame::FrameDevice;
use cadence_render::{DrawPipeline, MeshRenderer, MeshVertex, Space, Sprite, SpriteRenderer};
use glam::Vec2;
use tracing::{error, info};
use winit::event::ElementState;
use winit::keyboard::{KeyCode, PhysicalKey};

/// Camera pan speed in world units per second.
const PAN_SPEED: f32 = 4.0;

/// Zoom change per second, as a factor.
const ZOOM_RATE: f32 = 1.8;

/// Pixels per world unit at startup.
const INITIAL_ZOOM: f32 = 64.0;

/// Seconds between texture regenerations.
const TEXTURE_PERIOD: f32 = 3.0;

const TEXTURE_SIZE: u32 = 64;

const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

type Texture = <VulkanDevice as FrameDevice>::Texture;

pub struct Viewer {
    meshes: MeshRenderer<VulkanDevice>,
    sprites: SpriteRenderer<VulkanDevice>,
    overlay: MeshRenderer<VulkanDevice>,
    texture: Option<Texture>,
    generation: u32,
    since_swap: f32,
    camera: Vec2,
    zoom: f32,
    time: f32,
    held: HashSet<KeyCode>,
}

impl Viewer {
    fn upload_texture(device: &VulkanDevice, generation: u32) -> anyhow::Result<Texture> {
        let rgba = checkerboard(TEXTURE_SIZE, generation);
        let texture = device.create_texture(
            TEXTURE_SIZE,
            TEXTURE_SIZE,
            &rgba,
            &format!("checkerboard {generation}"),
        )?;
        Ok(texture)
    }

    /// Replace the sprite texture. The old one stays alive until the frames
    /// that sampled it completed.
    fn regenerate_texture(&mut self, ctx: &AppContext) -> anyhow::Result<()> {
        self.generation += 1;
        let texture = Self::upload_texture(ctx.device(), self.generation)?;
        if let Some(old) = self.texture.replace(texture) {
            ctx.scheduler().retire_texture(old);
        }
        info!(
            generation = self.generation,
            retired = ctx.scheduler().retired_count(),
            "Sprite texture regenerated"
        );
        Ok(())
    }

    fn axis(&self, negative: KeyCode, positive: KeyCode) -> f32 {
        let mut value = 0.0;
        if self.held.contains(&negative) {
            value -= 1.0;
        }
        if self.held.contains(&positive) {
            value += 1.0;
        }
        value
    }

    fn draw_scene(&mut self, device: &VulkanDevice) {
        // Ground grid
        for y in -4..=4 {
            for x in -6..=6 {
                let shade = if (x + y) % 2 == 0 { 0.22 } else { 0.30 };
                let colour = Colour::rgb(shade, shade, shade + 0.05);
                let cell = Rect::from_origin_size(Vec2::new(x as f32, y as f32), Vec2::splat(0.95));
                self.meshes
                    .draw_shape(&cell.corners(), &QUAD_INDICES, Vec2::ZERO, colour);
            }
        }

        // Spinning triangle
        let triangle: Vec<MeshVertex> = [Colour::RED, Colour::GREEN, Colour::BLUE]
            .iter()
            .enumerate()
            .map(|(i, &colour)| {
                let angle = self.time + i as f32 * std::f32::consts::TAU / 3.0;
                MeshVertex::new(Vec2::from_angle(angle) * 1.5, colour)
            })
            .collect();
        self.meshes.draw_offset(&triangle, &[0, 1, 2], Vec2::new(0.5, 0.5));

        // Sprites sampling the current texture
        if let Some(texture) = &self.texture {
            let descriptor = device.texture_descriptor(texture);
            let sprites: Vec<Sprite> = (0..5)
                .map(|i| {
                    let bob = (self.time * 2.0 + i as f32).sin() * 0.25;
                    let origin = Vec2::new(-5.0 + i as f32 * 2.5, -3.0 + bob);
                    Sprite::new(Rect::from_origin_size(origin, Vec2::splat(1.5)))
                })
                .collect();
            self.sprites.draw_all(descriptor, &sprites);
        }
    }

    fn draw_overlay(&mut self, width: f32) {
        // Progress until the next texture swap, in pixels from the top-left
        let progress = (self.since_swap / TEXTURE_PERIOD).clamp(0.0, 1.0);
        let track = Rect::from_origin_size(Vec2::new(16.0, 16.0), Vec2::new(width - 32.0, 8.0));
        let bar = Rect::from_origin_size(track.min, Vec2::new(track.size().x * progress, 8.0));

        self.overlay.draw_shape(
            &track.corners(),
            &QUAD_INDICES,
            Vec2::ZERO,
            Colour::WHITE.with_alpha(0.15),
        );
        self.overlay.draw_shape(
            &bar.corners(),
            &QUAD_INDICES,
            Vec2::ZERO,
            Colour::from_rgba8(240, 180, 60, 255),
        );
    }
}

impl CadenceApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let device = ctx.device();
        let viewer = Self {
            meshes: MeshRenderer::new(device, Space::World)?,
            sprites: SpriteRenderer::new(device, Space::World)?,
            overlay: MeshRenderer::new(device, Space::Screen)?,
            texture: Some(Self::upload_texture(device, 0)?),
            generation: 0,
            since_swap: 0.0,
            camera: Vec2::ZERO,
            zoom: INITIAL_ZOOM,
            time: 0.0,
            held: HashSet::new(),
        };

        info!("Viewer initialized: arrows pan, PageUp/PageDown zoom, Escape quits");
        Ok(viewer)
    }

    fn update(&mut self, ctx: &mut AppContext, dt: f32) {
        self.time += dt;
        self.since_swap += dt;

        let pan = Vec2::new(
            self.axis(KeyCode::ArrowLeft, KeyCode::ArrowRight),
            self.axis(KeyCode::ArrowDown, KeyCode::ArrowUp),
        );
        self.camera += pan * PAN_SPEED * dt;
        let zoom = self.axis(KeyCode::PageDown, KeyCode::PageUp);
        self.zoom = (self.zoom * ZOOM_RATE.powf(zoom * dt)).clamp(8.0, 512.0);

        if self.since_swap >= TEXTURE_PERIOD {
            self.since_swap = 0.0;
            if let Err(e) = self.regenerate_texture(ctx) {
                error!("Failed to regenerate texture: {e:#}");
            }
        }

        let extent = ctx.extent();
        ctx.set_coordinate_space(CoordinateSpace::for_extent(
            extent.width,
            extent.height,
            self.camera,
            self.zoom,
        ));
    }

    fn render(&mut self, frame: &FrameContext<'_>) -> anyhow::Result<()> {
        self.draw_scene(frame.device());
        let size = frame.window.inner_size();
        self.draw_overlay(size.width as f32);

        let scheduler = frame.scheduler();
        self.meshes.flush(scheduler)?;
        self.sprites.flush(scheduler)?;
        self.overlay.flush(scheduler)?;
        Ok(())
    }

    fn on_event(&mut self, ctx: &mut AppContext, event: &WindowEvent) -> bool {
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return false;
        };
        let PhysicalKey::Code(code) = event.physical_key else {
            return false;
        };

        match (code, event.state) {
            (KeyCode::Escape, ElementState::Pressed) => ctx.request_quit(),
            (code, ElementState::Pressed) => {
                self.held.insert(code);
            }
            (code, ElementState::Released) => {
                self.held.remove(&code);
            }
        }
        true
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        let device = ctx.device();
        for result in [
            self.meshes.destroy(device),
            self.sprites.destroy(device),
            self.overlay.destroy(device),
        ] {
            if let Err(e) = result {
                error!("Failed to destroy renderer: {e}");
            }
        }
        if let Some(texture) = self.texture.take() {
            if let Err(e) = device.destroy_texture(texture) {
                error!("Failed to destroy texture: {e}");
            }
        }
    }
}

/// Two-tone checkerboard whose colours rotate with `generation`.
fn checkerboard(size: u32, generation: u32) -> Vec<u8> {
    const PALETTE: [[u8; 4]; 4] = [
        [230, 90, 80, 255],
        [80, 170, 230, 255],
        [120, 210, 110, 255],
        [235, 200, 90, 255],
    ];
    let light = PALETTE[generation as usize % PALETTE.len()];
    let [r, g, b, a] = PALETTE[(generation as usize + 1) % PALETTE.len()];
    let dark = [r / 2, g / 2, b / 2, a];

    let cell = (size / 8).max(1);
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            if (x / cell + y / cell) % 2 == 0 {
                light
            } else {
                dark
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_is_tightly_packed_rgba() {
        let texels = checkerboard(16, 0);
        assert_eq!(texels.len(), 16 * 16 * 4);
        assert_eq!(&texels[..4], &[230, 90, 80, 255]);
        // Second cell of the first row is dark
        assert_eq!(&texels[2 * 4..3 * 4], &[40, 85, 115, 255]);
    }

    #[test]
    fn generations_change_colours() {
        assert_ne!(checkerboard(8, 0), checkerboard(8, 1));
        assert_eq!(checkerboard(8, 0), checkerboard(8, 4));
        assert!(checkerboard(8, 3).chunks_exact(4).all(|texel| texel[3] == 255));
    }
}
