//! Traversal stacks
//!
//! Both stacks are pushed and popped around each recursive visit. The
//! visitor wraps every push in a scope helper so early returns and errors
//! still pop.

use std::sync::Arc;

use crate::foundation::math::Mat4;
use crate::render::PipelineState;

/// Accumulated model matrices, identity at the bottom
#[derive(Debug, Clone)]
pub struct MatrixStack {
    stack: Vec<Mat4>,
}

impl MatrixStack {
    /// Stack holding only the identity
    pub fn new() -> Self {
        Self {
            stack: vec![Mat4::identity()],
        }
    }

    /// Push `top * local`
    pub fn push_relative(&mut self, local: &Mat4) {
        let accumulated = self.top() * local;
        self.stack.push(accumulated);
    }

    /// Push `matrix` as-is, ignoring what is below
    pub fn push_absolute(&mut self, matrix: Mat4) {
        self.stack.push(matrix);
    }

    /// Pop the top matrix; the identity at the bottom is never popped
    pub fn pop(&mut self) -> Option<Mat4> {
        if self.stack.len() > 1 {
            self.stack.pop()
        } else {
            None
        }
    }

    /// Current accumulated matrix
    pub fn top(&self) -> &Mat4 {
        // Never empty: the identity at the bottom stays
        &self.stack[self.stack.len() - 1]
    }

    /// Pushed matrices above the identity
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    /// Back to the identity alone
    pub fn reset(&mut self) {
        self.stack.truncate(1);
        self.stack[0] = Mat4::identity();
    }
}

impl Default for MatrixStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Pipeline-state overrides of the ancestors being visited
#[derive(Debug, Clone, Default)]
pub struct PipelineStateStack {
    stack: Vec<Arc<PipelineState>>,
}

impl PipelineStateStack {
    /// Empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an override
    pub fn push(&mut self, state: Arc<PipelineState>) {
        self.stack.push(state);
    }

    /// Pop the nearest override
    pub fn pop(&mut self) -> Option<Arc<PipelineState>> {
        self.stack.pop()
    }

    /// Nearest override
    pub fn top(&self) -> Option<&Arc<PipelineState>> {
        self.stack.last()
    }

    /// Effective state: `local`, else the nearest override, else `fallback`
    pub fn resolve<'a>(
        &'a self,
        local: Option<&'a Arc<PipelineState>>,
        fallback: &'a Arc<PipelineState>,
    ) -> &'a Arc<PipelineState> {
        local.or_else(|| self.top()).unwrap_or(fallback)
    }

    /// Number of overrides
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Drop every override
    pub fn clear(&mut self) {
        self.stack.clear();
    }
}
