//! Reading the same expressions from several trees as one entry space.

use crate::config::ArraysRequest;
use crate::error::{ReadError, Result};
use crate::interpretation::ArrayGroup;
use crate::pipeline::StepSize;
use crate::tree::{Report, Tree, TreeIterator};
use tracing::debug;

/// Steps through every tree in order. Entry numbers in the groups and
/// reports continue from one tree to the next.
pub fn iterate<'t>(
    trees: &'t [Tree],
    request: &ArraysRequest,
    step_size: impl Into<StepSize>,
) -> MultiTreeIterator<'t> {
    MultiTreeIterator {
        trees,
        request: request.clone(),
        step_size: step_size.into(),
        next_tree: 0,
        current: None,
        global_offset: 0,
        finished: false,
    }
}

pub struct MultiTreeIterator<'t> {
    trees: &'t [Tree],
    request: ArraysRequest,
    step_size: StepSize,
    next_tree: usize,
    current: Option<TreeIterator<'t>>,
    global_offset: u64,
    finished: bool,
}

impl Iterator for MultiTreeIterator<'_> {
    type Item = Result<(ArrayGroup, Report)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(current) = &mut self.current {
                match current.next() {
                    Some(Err(err)) => {
                        self.finished = true;
                        return Some(Err(err));
                    }
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }

            let tree = self.trees.get(self.next_tree)?;
            self.next_tree += 1;
            debug!(
                object_path = %tree.object_path(),
                file_path = %tree.file_path(),
                global_offset = self.global_offset,
                "next tree"
            );
            match tree.iterate(&self.request, self.step_size.clone()) {
                Ok(iterator) => {
                    self.current = Some(iterator.with_global_offset(self.global_offset));
                    self.global_offset += tree.num_entries();
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Materializes the request from every tree and joins the results, with
/// entry numbers continuing from one tree to the next.
pub fn concatenate(trees: &[Tree], request: &ArraysRequest) -> Result<ArrayGroup> {
    let first = trees
        .first()
        .ok_or_else(|| ReadError::mismatch("nothing to concatenate"))?;
    let library = first.library();

    let mut groups = Vec::with_capacity(trees.len());
    let mut global_offset = 0;
    for tree in trees {
        let group = tree.arrays(request)?;
        groups.push(library.global_index(group, global_offset));
        global_offset += tree.num_entries();
    }
    library.concatenate(groups)
}
