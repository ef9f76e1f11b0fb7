use std::sync::Arc;

use egui::epaint::{Color32, Mesh, Pos2, Shape, Vec2, Vertex};
use egui::Painter;

use crate::canvas::DrawMode;
use crate::geometry::{PolygonMesh, RenderedMesh};
use crate::spacial::ToPos2;

/// Maps canvas device space to screen space, the Y axis is flipped.
#[derive(Debug, Clone, Copy)]
pub struct ViewState {
    pub translation: Vec2,
    pub scale: f32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            translation: Vec2::ZERO,
            scale: 1.0,
        }
    }
}

impl ViewState {
    pub fn to_screen(&self, vertex: [f32; 2]) -> Pos2 {
        let position = vertex.to_pos2();
        Pos2::new(position.x * self.scale, -position.y * self.scale) + self.translation
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LayerColors {
    pub dark: Color32,
    /// Used for erased geometry, should match whatever is behind the layer.
    pub background: Color32,
}

pub fn to_egui_mesh(mesh: &PolygonMesh, view: &ViewState, color: Color32) -> Mesh {
    let vertices = mesh
        .vertices
        .iter()
        .map(|vertex| Vertex {
            pos: view.to_screen(*vertex),
            uv: egui::epaint::WHITE_UV,
            color,
        })
        .collect();

    Mesh {
        vertices,
        indices: mesh.indices.clone(),
        texture_id: egui::TextureId::default(),
    }
}

/// Paints meshes produced by a [`crate::geometry::MeshCanvas`] in the order they were recorded.
#[profiling::function]
pub fn paint_meshes(painter: &Painter, meshes: &[RenderedMesh], view: &ViewState, colors: &LayerColors) {
    for rendered in meshes {
        let color = match rendered.mode {
            DrawMode::Draw => colors.dark,
            DrawMode::Erase => colors.background,
        };
        painter.add(Shape::Mesh(Arc::new(to_egui_mesh(&rendered.mesh, view, color))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_vertices_are_flipped_scaled_and_translated() {
        // given
        let mesh = PolygonMesh {
            vertices: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 2.0]],
            indices: vec![0, 1, 2],
        };
        let view = ViewState {
            translation: Vec2::new(100.0, 50.0),
            scale: 10.0,
        };

        // when
        let egui_mesh = to_egui_mesh(&mesh, &view, Color32::RED);

        // then
        let positions = egui_mesh
            .vertices
            .iter()
            .map(|vertex| vertex.pos)
            .collect::<Vec<_>>();
        assert_eq!(positions, vec![
            Pos2::new(100.0, 50.0),
            Pos2::new(110.0, 50.0),
            Pos2::new(100.0, 30.0)
        ]);
        assert_eq!(egui_mesh.indices, vec![0, 1, 2]);
        assert!(egui_mesh
            .vertices
            .iter()
            .all(|vertex| vertex.color == Color32::RED));
    }
}
