/// Surface area heuristic shared by both split strategies.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SahCost {
    pub intersection_cost: f32,
}

impl SahCost {
    pub const TRAVERSAL_COST: f32 = 1.0;

    pub fn new(intersection_cost: f32) -> Self {
        Self { intersection_cost }
    }

    /// `cost_factor` is `N_L * halfArea(L) + N_R * halfArea(R)`.
    pub fn split_cost(&self, cost_factor: f32, parent_surface_area: f32) -> f32 {
        if parent_surface_area <= 0.0 {
            return Self::TRAVERSAL_COST;
        }
        2.0 * self.intersection_cost * cost_factor / parent_surface_area + Self::TRAVERSAL_COST
    }

    pub fn non_split_cost(&self, num_objects: usize) -> f32 {
        num_objects as f32 * self.intersection_cost
    }

    /// Ties favour not splitting, but only while the range still fits in a leaf.
    pub fn prefers_leaf(
        &self,
        cost_factor: f32,
        parent_surface_area: f32,
        num_objects: usize,
        max_objects_per_leaf: usize,
    ) -> bool {
        self.split_cost(cost_factor, parent_surface_area) >= self.non_split_cost(num_objects)
            && num_objects <= max_objects_per_leaf
    }
}
