//! Collaborator interfaces for pipelines and render passes
//!
//! Pipelines and render passes are built outside this crate. Command buffers
//! only need the handles below.

use ash::vk;

/// A pipeline that can be bound to a command buffer
pub trait PipelineBinding {
    /// Graphics or compute
    fn is_graphics(&self) -> bool;
    /// Native pipeline handle
    fn pipeline(&self) -> vk::Pipeline;
    /// Layout used for descriptor sets and push constants
    fn layout(&self) -> vk::PipelineLayout;

    /// Bind point matching [`PipelineBinding::is_graphics`]
    fn bind_point(&self) -> vk::PipelineBindPoint {
        if self.is_graphics() {
            vk::PipelineBindPoint::GRAPHICS
        } else {
            vk::PipelineBindPoint::COMPUTE
        }
    }
}

/// A render pass together with the framebuffer it currently renders into
pub trait RenderPassTarget {
    /// Native render pass handle
    fn render_pass(&self) -> vk::RenderPass;
    /// Framebuffer for the current frame
    fn framebuffer(&self) -> vk::Framebuffer;
    /// Area affected by the pass
    fn render_area(&self) -> vk::Rect2D;
    /// One clear value per attachment
    fn clear_values(&self) -> &[vk::ClearValue];
    /// Dynamic viewports applied after the pass begins
    fn viewports(&self) -> &[vk::Viewport] {
        &[]
    }
    /// Dynamic scissors applied after the pass begins
    fn scissors(&self) -> &[vk::Rect2D] {
        &[]
    }
}

/// Raw pipeline handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineHandles {
    /// Pipeline
    pub pipeline: vk::Pipeline,
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
    /// Graphics (true) or compute (false)
    pub graphics: bool,
}

impl PipelineBinding for PipelineHandles {
    fn is_graphics(&self) -> bool {
        self.graphics
    }

    fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

/// Owned render pass description
#[derive(Clone, Default)]
pub struct RenderPassInfo {
    /// Render pass
    pub render_pass: vk::RenderPass,
    /// Current framebuffer
    pub framebuffer: vk::Framebuffer,
    /// Render area
    pub render_area: vk::Rect2D,
    /// Clear values, one per attachment
    pub clear_values: Vec<vk::ClearValue>,
    /// Viewports
    pub viewports: Vec<vk::Viewport>,
    /// Scissors
    pub scissors: Vec<vk::Rect2D>,
}

impl RenderPassInfo {
    /// Pass covering `extent` with one clear value per attachment
    pub fn new(
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: Vec<vk::ClearValue>,
    ) -> Self {
        Self {
            render_pass,
            framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            clear_values,
            viewports: Vec::new(),
            scissors: Vec::new(),
        }
    }

    /// Add a full-area viewport and scissor
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn with_full_viewport(mut self) -> Self {
        let extent = self.render_area.extent;
        self.viewports.push(vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        self.scissors.push(self.render_area);
        self
    }
}

impl RenderPassTarget for RenderPassInfo {
    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }

    fn clear_values(&self) -> &[vk::ClearValue] {
        &self.clear_values
    }

    fn viewports(&self) -> &[vk::Viewport] {
        &self.viewports
    }

    fn scissors(&self) -> &[vk::Rect2D] {
        &self.scissors
    }
}
