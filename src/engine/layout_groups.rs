//! Layout groups: named sets of staves (or other groups) that
//! annotations attach to when they must clear several staves at once.

use std::collections::HashMap;

use serde::Serialize;

use super::annotations::VerticalPos;
use super::{LayoutGroupId, RowId};
use crate::error::{Result, ScoreError};
use crate::geometry::Rect;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GroupMember {
    Staff(usize),
    /// Another group, looked up by name when the layout runs.
    Group(String),
}

/// Boxes already stacked on one side of a target within one row.
#[derive(Debug, Clone, Default)]
pub(crate) struct Bucket {
    placed: Vec<Rect>,
}

impl Bucket {
    /// Stack a box spanning `x0..x1` of `height` beyond `edge` (the top of
    /// the content for `Above`, its bottom for `Below`), moving past every
    /// earlier box it would overlap.
    pub(crate) fn place(&mut self, x0: f64, x1: f64, height: f64, edge: f64, pos: VerticalPos, gap: f64) -> Rect {
        let mut near = match pos {
            VerticalPos::Above => edge - gap,
            VerticalPos::Below => edge + gap,
        };
        loop {
            let candidate = match pos {
                VerticalPos::Above => Rect::new(x0, near - height, x1, near),
                VerticalPos::Below => Rect::new(x0, near, x1, near + height),
            };
            let hit = self
                .placed
                .iter()
                .filter(|p| p.left < candidate.right && candidate.left < p.right)
                .filter(|p| p.top < candidate.bottom && candidate.top < p.bottom)
                .map(|p| match pos {
                    VerticalPos::Above => p.top - gap,
                    VerticalPos::Below => p.bottom + gap,
                })
                .reduce(|a, b| match pos {
                    VerticalPos::Above => a.min(b),
                    VerticalPos::Below => a.max(b),
                });
            match hit {
                Some(next) => near = next,
                None => {
                    self.placed.push(candidate);
                    return candidate;
                }
            }
        }
    }

    pub(crate) fn rects(&self) -> &[Rect] {
        &self.placed
    }

    pub(crate) fn offset(&mut self, dx: f64, dy: f64) {
        for r in &mut self.placed {
            r.offset(dx, dy);
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayoutGroup {
    pub id: LayoutGroupId,
    pub name: String,
    pub members: Vec<GroupMember>,
    pub(crate) placements: HashMap<(RowId, VerticalPos), Bucket>,
}

impl LayoutGroup {
    pub(crate) fn new(id: LayoutGroupId, name: &str, members: Vec<GroupMember>) -> Self {
        Self {
            id,
            name: name.to_string(),
            members,
            placements: HashMap::new(),
        }
    }

    /// Forget every placement from the previous pass.
    pub fn clear_position_and_layout(&mut self) {
        self.placements.clear();
    }

    pub(crate) fn bucket(&mut self, row: RowId, pos: VerticalPos) -> &mut Bucket {
        self.placements.entry((row, pos)).or_default()
    }

    pub(crate) fn offset_row(&mut self, row: RowId, dx: f64, dy: f64) {
        for ((r, _), bucket) in self.placements.iter_mut() {
            if *r == row {
                bucket.offset(dx, dy);
            }
        }
    }
}

/// Staves a group stands for, following nested groups.
pub(crate) fn resolve_staves(groups: &[Option<LayoutGroup>], id: LayoutGroupId) -> Result<Vec<usize>> {
    let mut out = Vec::new();
    let mut stack = Vec::new();
    collect(groups, id, &mut stack, &mut out)?;
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

fn collect(
    groups: &[Option<LayoutGroup>],
    id: LayoutGroupId,
    stack: &mut Vec<LayoutGroupId>,
    out: &mut Vec<usize>,
) -> Result<()> {
    let Some(group) = groups.get(id.0).and_then(Option::as_ref) else {
        return Err(ScoreError::UnknownGroupMember(format!("#{}", id.0)));
    };
    if stack.contains(&id) {
        return Err(ScoreError::LayoutGroupCycle(group.name.clone()));
    }
    stack.push(id);
    for member in &group.members {
        match member {
            GroupMember::Staff(s) => out.push(*s),
            GroupMember::Group(name) => {
                let child = find_group(groups, name).ok_or_else(|| ScoreError::UnknownGroupMember(name.clone()))?;
                collect(groups, child, stack, out)?;
            }
        }
    }
    stack.pop();
    Ok(())
}

pub(crate) fn find_group(groups: &[Option<LayoutGroup>], name: &str) -> Option<LayoutGroupId> {
    groups.iter().flatten().find(|g| g.name == name).map(|g| g.id)
}
