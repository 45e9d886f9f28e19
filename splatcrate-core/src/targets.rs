//! The fixed set of render targets owned by one splatting pipeline

use crate::point::{ExtractedPoint, PointRecord, RadiusBounds};
use crate::render_target::RenderTarget;

/// Selects one of the two radius-bound buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundsSlot {
    Ping,
    Pong,
}

impl BoundsSlot {
    /// Buffer read during refinement round `round`
    pub fn front_for_round(round: u32) -> Self {
        if round % 2 == 0 {
            BoundsSlot::Ping
        } else {
            BoundsSlot::Pong
        }
    }

    /// Buffer holding the settled bracket after `rounds` rounds
    pub fn after_rounds(rounds: u32) -> Self {
        Self::front_for_round(rounds)
    }

    pub fn other(self) -> Self {
        match self {
            BoundsSlot::Ping => BoundsSlot::Pong,
            BoundsSlot::Pong => BoundsSlot::Ping,
        }
    }

    /// Position in `RenderTargetSet::bounds`
    pub fn index(self) -> usize {
        match self {
            BoundsSlot::Ping => 0,
            BoundsSlot::Pong => 1,
        }
    }
}

/// Every buffer the estimator reads or writes during a frame
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetSet {
    /// World position per pixel, `w = 1` where depth was valid
    pub position: RenderTarget<[f32; 4]>,
    /// Ping and pong radius brackets, written at each point's own pixel
    pub bounds: [RenderTarget<RadiusBounds>; 2],
    /// Neighbors gathered at each point's pixel
    pub neighbor_counts: RenderTarget<f32>,
    /// Largest reach of any disk covering each pixel
    pub feedback_radius: RenderTarget<f32>,
    /// Extracted points per coarse cell
    pub density_grid: RenderTarget<f32>,
}

impl RenderTargetSet {
    /// Allocate cleared targets for a screen and its coarse grid
    pub fn new(width: u32, height: u32, grid_width: u32, grid_height: u32) -> Self {
        Self {
            position: RenderTarget::new(width, height),
            bounds: [RenderTarget::new(width, height), RenderTarget::new(width, height)],
            neighbor_counts: RenderTarget::new(width, height),
            feedback_radius: RenderTarget::new(width, height),
            density_grid: RenderTarget::new(grid_width, grid_height),
        }
    }

    /// Screen size shared by all full-resolution targets
    pub fn size(&self) -> (u32, u32) {
        self.position.size()
    }

    pub fn bounds(&self, slot: BoundsSlot) -> &RenderTarget<RadiusBounds> {
        &self.bounds[slot.index()]
    }

    pub fn bounds_mut(&mut self, slot: BoundsSlot) -> &mut RenderTarget<RadiusBounds> {
        &mut self.bounds[slot.index()]
    }

    /// Borrow `front` for reading and the other buffer for writing
    pub fn bounds_pair_mut(
        &mut self,
        front: BoundsSlot,
    ) -> (&RenderTarget<RadiusBounds>, &mut RenderTarget<RadiusBounds>) {
        let [ping, pong] = &mut self.bounds;
        match front {
            BoundsSlot::Ping => (ping, pong),
            BoundsSlot::Pong => (pong, ping),
        }
    }

    /// Reset every target to its cleared sentinel
    pub fn clear(&mut self) {
        self.position.clear();
        self.bounds.iter_mut().for_each(RenderTarget::clear);
        self.neighbor_counts.clear();
        self.feedback_radius.clear();
        self.density_grid.clear();
    }

    /// Assemble the per-point state of `points`, reading brackets from `slot`
    pub fn point_records(&self, points: &[ExtractedPoint], slot: BoundsSlot) -> Vec<PointRecord> {
        let bounds = self.bounds(slot);
        points
            .iter()
            .map(|point| PointRecord {
                pixel: point.pixel,
                position: point.position,
                radius_bounds: bounds[point.pixel],
                neighbor_count: self.neighbor_counts[point.pixel],
                feedback_radius: self.feedback_radius[point.pixel],
            })
            .collect()
    }

    /// True when no target holds a contribution
    pub fn is_cleared(&self) -> bool {
        self.position.iter().all(|p| *p == [0.0; 4])
            && self
                .bounds
                .iter()
                .all(|target| target.iter().all(|b| *b == RadiusBounds::default()))
            && self.neighbor_counts.iter().all(|v| *v == 0.0)
            && self.feedback_radius.iter().all(|v| *v == 0.0)
            && self.density_grid.iter().all(|v| *v == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_pong_alternates() {
        assert_eq!(BoundsSlot::front_for_round(0), BoundsSlot::Ping);
        assert_eq!(BoundsSlot::front_for_round(1), BoundsSlot::Pong);
        assert_eq!(BoundsSlot::front_for_round(2), BoundsSlot::Ping);
        assert_eq!(BoundsSlot::Ping.other(), BoundsSlot::Pong);
    }

    #[test]
    fn test_final_slot_follows_last_write() {
        // no rounds: the seeded ping buffer is final
        assert_eq!(BoundsSlot::after_rounds(0), BoundsSlot::Ping);
        // round 0 writes pong, round 1 writes ping
        assert_eq!(BoundsSlot::after_rounds(1), BoundsSlot::Pong);
        assert_eq!(BoundsSlot::after_rounds(2), BoundsSlot::Ping);
    }

    #[test]
    fn test_bounds_pair_borrows_distinct_buffers() {
        let mut targets = RenderTargetSet::new(4, 4, 1, 1);
        targets.bounds_mut(BoundsSlot::Ping).set(1, 1, RadiusBounds::new(0.0, 2.0));

        let (front, back) = targets.bounds_pair_mut(BoundsSlot::Ping);
        back.set(1, 1, RadiusBounds::new(1.0, 2.0));
        assert_eq!(front[[1, 1]], RadiusBounds::new(0.0, 2.0));

        assert_eq!(targets.bounds(BoundsSlot::Pong)[[1, 1]], RadiusBounds::new(1.0, 2.0));
        assert!(!targets.is_cleared());
        targets.clear();
        assert!(targets.is_cleared());
    }
}
