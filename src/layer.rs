use log::{debug, trace};

use crate::canvas::Canvas;
use crate::image::Image;
use crate::renderer::{NetRenderer, RenderError, RenderReport};

#[derive(Clone, Debug)]
pub struct Layer {
    pub name: String,
    pub image: Image,
    pub visible: bool,
}

impl Layer {
    pub fn new(name: impl Into<String>, image: Image) -> Self {
        Self {
            name: name.into(),
            image,
            visible: true,
        }
    }
}

/// Ordered layers, the first layer is at the bottom and painted first.
#[derive(Clone, Debug, Default)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a layer on top of the stack, returns its index.
    pub fn push(&mut self, layer: Layer) -> usize {
        debug!("layer added. name: '{}', index: {}", layer.name, self.layers.len());
        self.layers.push(layer);
        self.layers.len() - 1
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Returns `false` if there is no layer at `index`.
    pub fn set_visible(&mut self, index: usize, visible: bool) -> bool {
        match self.layers.get_mut(index) {
            Some(layer) => {
                layer.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Renders the visible layers bottom to top, each one isolated by a `save`/`restore` pair.
    ///
    /// Stops at the first layer that fails, the reports of the layers rendered so far are dropped.
    #[profiling::function]
    pub fn render<C: Canvas + ?Sized>(
        &self,
        renderer: &NetRenderer,
        canvas: &mut C,
    ) -> Result<Vec<RenderReport>, RenderError> {
        let mut reports = Vec::with_capacity(self.layers.len());

        for layer in self
            .layers
            .iter()
            .filter(|layer| layer.visible)
        {
            trace!("rendering layer. name: '{}'", layer.name);
            canvas.save();
            let result = renderer.render(&layer.image, canvas);
            canvas.restore();
            reports.push(result?);
        }

        Ok(reports)
    }
}
