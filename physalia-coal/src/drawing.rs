//! Presentation-layout coordinates.
//!
//! These routines fill each node's `x_coord`/`y_coord` for plotting;
//! statistics never read them. The trait coordinates `x`/`y` are left
//! untouched.

use physalia_core::{PhysaliaError, Result};

use crate::tree::CoalescentTree;

impl CoalescentTree {
    /// Rectangular layout: x is time, tips take evenly spaced y ranks in
    /// pre-order, internal nodes average their children.
    ///
    /// Siblings are first reordered so larger subtrees come later, which
    /// makes the trunk follow a rough diagonal in pre-order.
    pub fn adjust_coords(&mut self) {
        for id in self.postorder() {
            let mut kids = self.n(id).children.clone();
            if kids.len() > 1 {
                kids.sort_by_key(|&c| self.subtree_size(c));
                self.reorder_children(id, kids).unwrap();
            }
        }

        let mut rank = 0.0;
        for id in self.preorder() {
            let time = self.n(id).time;
            let node = self.n_mut(id);
            node.x_coord = time;
            if node.leaf {
                node.y_coord = rank;
                rank += 1.0;
            }
        }

        self.average_internal_y();
    }

    /// Equal-angle radial layout: the root sits at the origin and each
    /// bifurcation divides its angular sector in proportion to descendant
    /// tip counts.
    pub fn adjust_circular_coords(&mut self) {
        let root = self.root();
        self.n_mut(root).x_coord = 0.0;
        self.n_mut(root).y_coord = 0.0;

        let tips = self.leaf_count().max(1);
        let angle_per_tip = 2.0 * std::f64::consts::PI / tips as f64;

        for id in self.preorder() {
            let kids = self.n(id).children.clone();
            if kids.len() != 2 {
                continue;
            }
            let (left, right) = (kids[0], kids[1]);
            let (px, py) = (self.n(id).x_coord, self.n(id).y_coord);

            let basis = match self.n(id).parent {
                Some(pp) => {
                    let dx = px - self.n(pp).x_coord;
                    let dy = py - self.n(pp).y_coord;
                    if dx != 0.0 {
                        dy.atan2(dx)
                    } else {
                        0.0
                    }
                }
                None => 0.0,
            };

            let left_sector = angle_per_tip * self.descendant_tip_count(left) as f64;
            let right_sector = angle_per_tip * self.descendant_tip_count(right) as f64;
            let total = left_sector + right_sector;
            let left_angle = basis + 0.5 * total - 0.5 * left_sector;
            let right_angle = basis - 0.5 * total + 0.5 * right_sector;

            let ll = self.n(left).length;
            let rl = self.n(right).length;
            {
                let node = self.n_mut(left);
                node.x_coord = px + ll * left_angle.cos();
                node.y_coord = py + ll * left_angle.sin();
            }
            {
                let node = self.n_mut(right);
                node.x_coord = px + rl * right_angle.cos();
                node.y_coord = py + rl * right_angle.sin();
            }
        }
    }

    /// Assign tip y ranks from a supplied name ordering, then average
    /// internal nodes over their children.
    pub fn set_coords(&mut self, tip_ordering: &[&str]) -> Result<()> {
        for (rank, name) in tip_ordering.iter().enumerate() {
            let id = self.find_by_name(name).ok_or_else(|| {
                PhysaliaError::InvalidInput(format!("set_coords: no tip named '{}'", name))
            })?;
            self.n_mut(id).y_coord = rank as f64;
        }
        self.average_internal_y();
        Ok(())
    }

    fn average_internal_y(&mut self) {
        for id in self.postorder() {
            let kids = self.n(id).children.clone();
            match kids.len() {
                0 => {}
                1 => {
                    let y = self.n(kids[0]).y_coord;
                    self.n_mut(id).y_coord = y;
                }
                _ => {
                    let sum: f64 = kids.iter().map(|&c| self.n(c).y_coord).sum();
                    self.n_mut(id).y_coord = sum / kids.len() as f64;
                }
            }
        }
    }
}
