/// ASCII rasterizer for terminal rendering
use crossterm::{
    cursor,
    style::{Color, Print, ResetColor, SetForegroundColor},
    QueueableCommand,
};
use nalgebra::{Matrix3, Matrix4, Point3};
use promptmesh_core::{Camera, Transform};
use std::io::Write;

use crate::scene::{ObjectKind, Scene};

/// Character luminosity ramp for depth/shading (darkest to lightest)
const LUMINOSITY_RAMP: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// Terminal cells are roughly twice as tall as they are wide.
pub const CELL_ASPECT: f32 = 0.5;

/// Glyph used for point-cloud samples.
const POINT_GLYPH: char = '•';

/// ASCII renderer that converts 3D scenes to terminal characters
pub struct AsciiRenderer {
    width: usize,
    height: usize,
    depth_buffer: Vec<f32>,
    char_buffer: Vec<char>,
    color_buffer: Vec<Option<Color>>,
}

impl AsciiRenderer {
    pub fn new(width: usize, height: usize) -> Self {
        let size = width * height;
        Self {
            width,
            height,
            depth_buffer: vec![f32::INFINITY; size],
            char_buffer: vec![' '; size],
            color_buffer: vec![None; size],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Aspect ratio of the drawable area in physical units.
    pub fn viewport_aspect(&self) -> (f32, f32) {
        (self.width as f32 * CELL_ASPECT, self.height as f32)
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        *self = Self::new(width, height);
    }

    pub fn clear(&mut self) {
        self.depth_buffer.fill(f32::INFINITY);
        self.char_buffer.fill(' ');
        self.color_buffer.fill(None);
    }

    /// Character and explicit color at a cell, if inside the buffer.
    pub fn cell(&self, x: usize, y: usize) -> Option<(char, Option<Color>)> {
        (x < self.width && y < self.height).then(|| {
            let idx = y * self.width + x;
            (self.char_buffer[idx], self.color_buffer[idx])
        })
    }

    /// Number of cells that received a fragment this frame.
    pub fn covered_cells(&self) -> usize {
        self.depth_buffer.iter().filter(|d| d.is_finite()).count()
    }

    pub fn render_scene(&mut self, scene: &Scene) {
        self.clear();
        let object = &scene.object;
        let model = object.model_matrix();
        let mvp = Transform::mvp_matrix(
            &model,
            &scene.camera.view_matrix(),
            &scene.camera.projection_matrix(),
        );
        // Normals only need the rotation; the normalizing scale is uniform.
        let normal_matrix: Matrix3<f32> = object.rotation_matrix().fixed_view::<3, 3>(0, 0).clone_owned();

        match object.kind {
            ObjectKind::Solid => {
                for corners in &object.mesh.triangles {
                    let [a, b, c] = corners.map(|i| i as usize);
                    let normal = (object.normals[a] + object.normals[b] + object.normals[c])
                        .try_normalize(1e-12)
                        .map(|n| normal_matrix * n);
                    let brightness = normal.map_or(scene.ambient.intensity, |n| scene.shade(&n));
                    let Some(coords) = self.project_all(
                        &mvp,
                        [
                            &object.mesh.vertices[a],
                            &object.mesh.vertices[b],
                            &object.mesh.vertices[c],
                        ],
                    ) else {
                        continue; // Triangle is clipped
                    };
                    self.rasterize_triangle(&coords, ramp(brightness), None);
                }
            }
            ObjectKind::Points => {
                for (i, vertex) in object.mesh.vertices.iter().enumerate() {
                    let Some((x, y, depth)) =
                        Camera::project_to_screen(&mvp, vertex, self.width as u32, self.height as u32)
                    else {
                        continue;
                    };
                    let color = object
                        .mesh
                        .colors
                        .as_ref()
                        .and_then(|colors| colors.get(i))
                        .map(|&[r, g, b]| Color::Rgb { r, g, b });
                    let glyph = if color.is_some() {
                        POINT_GLYPH
                    } else {
                        // Nearer points read brighter.
                        ramp(1.0 - (depth + 1.0) * 0.5 + scene.ambient.intensity)
                    };
                    self.plot(x as i32, y as i32, depth, glyph, color);
                }
            }
        }
    }

    fn project_all(
        &self,
        mvp: &Matrix4<f32>,
        points: [&Point3<f32>; 3],
    ) -> Option<[(f32, f32, f32); 3]> {
        let (w, h) = (self.width as u32, self.height as u32);
        Some([
            Camera::project_to_screen(mvp, points[0], w, h)?,
            Camera::project_to_screen(mvp, points[1], w, h)?,
            Camera::project_to_screen(mvp, points[2], w, h)?,
        ])
    }

    fn plot(&mut self, x: i32, y: i32, depth: f32, character: char, color: Option<Color>) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let idx = y as usize * self.width + x as usize;
        if depth < self.depth_buffer[idx] {
            self.depth_buffer[idx] = depth;
            self.char_buffer[idx] = character;
            self.color_buffer[idx] = color;
        }
    }

    fn rasterize_triangle(&mut self, coords: &[(f32, f32, f32); 3], character: char, color: Option<Color>) {
        let (v0, v1, v2) = (coords[0], coords[1], coords[2]);

        // Bounding box
        let min_x = v0.0.min(v1.0).min(v2.0).floor() as i32;
        let max_x = v0.0.max(v1.0).max(v2.0).ceil() as i32;
        let min_y = v0.1.min(v1.1).min(v2.1).floor() as i32;
        let max_y = v0.1.max(v1.1).max(v2.1).ceil() as i32;

        // Clip to screen bounds
        let min_x = min_x.max(0);
        let max_x = max_x.min(self.width as i32 - 1);
        let min_y = min_y.max(0);
        let max_y = max_y.min(self.height as i32 - 1);

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;

                if let Some((w0, w1, w2)) = barycentric(
                    (v0.0, v0.1),
                    (v1.0, v1.1),
                    (v2.0, v2.1),
                    (px, py),
                ) {
                    if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                        let depth = w0 * v0.2 + w1 * v1.2 + w2 * v2.2;
                        self.plot(x, y, depth, character, color);
                    }
                }
            }
        }
    }

    /// Queue the buffer with its top-left corner at `(column, row)`.
    pub fn draw_at<W: Write>(&self, writer: &mut W, column: u16, row: u16) -> std::io::Result<()> {
        for y in 0..self.height {
            writer.queue(cursor::MoveTo(column, row.saturating_add(y as u16)))?;
            for x in 0..self.width {
                let idx = y * self.width + x;
                let c = self.char_buffer[idx];

                // Color based on character intensity unless the asset supplied one
                let color = self.color_buffer[idx].unwrap_or(match c {
                    ' ' | '.' | ':' => Color::DarkGrey,
                    '-' | '=' => Color::Grey,
                    '+' | '*' => Color::White,
                    '#' | '%' | '@' => Color::Cyan,
                    _ => Color::White,
                });

                writer.queue(SetForegroundColor(color))?;
                writer.queue(Print(c))?;
            }
        }
        writer.queue(ResetColor)?;
        Ok(())
    }
}

fn ramp(brightness: f32) -> char {
    let char_index = (brightness.clamp(0.0, 1.0) * (LUMINOSITY_RAMP.len() - 1) as f32) as usize;
    LUMINOSITY_RAMP[char_index.min(LUMINOSITY_RAMP.len() - 1)]
}

/// Calculate barycentric coordinates for a point in a triangle
fn barycentric(
    v0: (f32, f32),
    v1: (f32, f32),
    v2: (f32, f32),
    p: (f32, f32),
) -> Option<(f32, f32, f32)> {
    let denom = (v1.1 - v2.1) * (v0.0 - v2.0) + (v2.0 - v1.0) * (v0.1 - v2.1);

    if denom.abs() < 1e-6 {
        return None;
    }

    let w0 = ((v1.1 - v2.1) * (p.0 - v2.0) + (v2.0 - v1.0) * (p.1 - v2.1)) / denom;
    let w1 = ((v2.1 - v0.1) * (p.0 - v2.0) + (v0.0 - v2.0) * (p.1 - v2.1)) / denom;
    let w2 = 1.0 - w0 - w1;

    Some((w0, w1, w2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{SceneObject, SceneSettings};
    use promptmesh_core::{normalize, ParsedMesh};
    use std::rc::Rc;

    fn scene_for(mesh: ParsedMesh, width: usize, height: usize) -> Scene {
        let transform = normalize(&mesh);
        let object = SceneObject::build(Rc::new(mesh), transform).unwrap();
        let mut scene = Scene::new(object, &SceneSettings::default());
        scene.set_viewport(width as f32 * CELL_ASPECT, height as f32);
        scene
    }

    #[test]
    fn test_cube_covers_center() {
        let scene = scene_for(ParsedMesh::unit_cube(), 40, 20);
        let mut renderer = AsciiRenderer::new(40, 20);
        renderer.render_scene(&scene);
        assert!(renderer.covered_cells() > 0);
        let (c, _) = renderer.cell(20, 10).unwrap();
        assert_ne!(c, ' ');
    }

    #[test]
    fn test_colored_points_keep_their_color() {
        let mesh = ParsedMesh::new(vec![Point3::new(0.0, 0.0, 0.0)], vec![]).with_colors(vec![[250, 10, 10]]);
        let scene = scene_for(mesh, 21, 11);
        let mut renderer = AsciiRenderer::new(21, 11);
        renderer.render_scene(&scene);
        assert_eq!(renderer.covered_cells(), 1);
        assert_eq!(
            renderer.cell(10, 5),
            Some((POINT_GLYPH, Some(Color::Rgb { r: 250, g: 10, b: 10 })))
        );
    }

    #[test]
    fn test_draw_emits_every_row() {
        let renderer = AsciiRenderer::new(3, 2);
        let mut out = Vec::new();
        renderer.draw_at(&mut out, 0, 0).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert_eq!(text.matches(' ').count(), 6);
    }

    #[test]
    fn test_barycentric_degenerate() {
        assert!(barycentric((0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (0.5, 0.5)).is_none());
    }
}
