//! Layout of evaluated cell groups into absolute coordinates.
//!
//! A [`CellGroup`] holds evaluated cells and nested regions at
//! template-relative anchors. Finalizing propagates per-row and per-column
//! size deltas outward: a nested region that grew pushes later rows or
//! columns away, one that shrank lets them collapse, and literal cells pin
//! their own row and column in place. Formula references that land inside
//! the group's template bounds are resolved against the placed grid at the
//! innermost level that contains them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::cells::{Cell, FuncCell, Merge};
use crate::engine::directive::LoopDirection;

/// Height and width of a region, in cells.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub height: usize,
    pub width: usize,
}

impl Size {
    pub fn new(height: usize, width: usize) -> Size {
        Size { height, width }
    }
}

/// A nested region inside a [`CellGroup`].
#[derive(Debug)]
pub enum ChildGroup {
    Group(CellGroup),
    Loop(LoopCellGroup),
}

impl ChildGroup {
    fn initial_size(&self) -> Size {
        match self {
            ChildGroup::Group(group) => group.initial_size,
            ChildGroup::Loop(group) => group.initial_size,
        }
    }

    fn into_final(self) -> FinalResult {
        match self {
            ChildGroup::Group(group) => group.into_final(),
            ChildGroup::Loop(group) => group.into_final(),
        }
    }
}

/// Absolute placement of one region.
///
/// Keys are the original template-relative coordinates; the cells stored
/// under a key carry their final positions. A key maps to several cells
/// when a loop expanded that coordinate.
#[derive(Debug, Default)]
pub struct FinalResult {
    pub cells: BTreeMap<(usize, usize), Vec<Cell>>,
    pub func_cells: BTreeMap<(usize, usize), Vec<FuncCell>>,
    pub merges: Vec<Merge>,
    pub size: Size,
}

/// A rectangular template region with its evaluated content.
#[derive(Debug)]
pub struct CellGroup {
    pub initial_size: Size,
    cells: Vec<Cell>,
    func_cells: Vec<FuncCell>,
    merges: Vec<Merge>,
    groups: Vec<((usize, usize), ChildGroup)>,
}

impl CellGroup {
    pub fn new(initial_size: Size) -> CellGroup {
        CellGroup {
            initial_size,
            cells: Vec::new(),
            func_cells: Vec::new(),
            merges: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn add_cell(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    pub fn add_func_cell(&mut self, cell: FuncCell) {
        self.func_cells.push(cell);
    }

    pub fn add_merge(&mut self, row: usize, col: usize, rows: usize, cols: usize) {
        self.merges.push(Merge::new(row, col, rows, cols));
    }

    pub fn add_group(&mut self, row: usize, col: usize, group: ChildGroup) {
        self.groups.push(((row, col), group));
    }

    /// Finalize the region: place nested regions, shift rows and columns by
    /// the accumulated size deltas, and resolve in-bounds formula
    /// references.
    pub fn into_final(self) -> FinalResult {
        let Size { height, width } = self.initial_size;
        let CellGroup {
            cells,
            func_cells,
            merges,
            groups,
            ..
        } = self;

        let children: Vec<((usize, usize), Size, FinalResult)> = groups
            .into_iter()
            .map(|(anchor, child)| {
                let initial = child.initial_size();
                (anchor, initial, child.into_final())
            })
            .collect();

        // Per-coordinate size-delta contributions. One slot past the
        // template edge: growth is attributed to the slot after a region's
        // first row or column, which can sit on the edge itself.
        let mut row_contrib: Vec<Vec<Option<isize>>> = vec![vec![None; width]; height + 1];
        let mut col_contrib: Vec<Vec<Option<isize>>> = vec![vec![None; height]; width + 1];

        for ((row, col), initial, result) in &children {
            let (row, col) = (*row, *col);
            let placed = result.size;
            if placed.width > initial.width {
                for i in 0..initial.width {
                    col_contrib[col + i][row] = Some(0);
                }
                col_contrib[col + 1][row] = Some((placed.width - initial.width) as isize);
            } else {
                for i in col..col + placed.width {
                    col_contrib[i][row] = Some(col_contrib[i][row].unwrap_or(0).max(0));
                }
                for i in col + placed.width..col + initial.width {
                    col_contrib[i][row] = Some(-1);
                }
            }
            if placed.height > initial.height {
                for i in 0..initial.height {
                    row_contrib[row + i][col] = Some(0);
                }
                row_contrib[row + 1][col] = Some((placed.height - initial.height) as isize);
            } else {
                for i in row..row + placed.height {
                    row_contrib[i][col] = Some(row_contrib[i][col].unwrap_or(0).max(0));
                }
                for i in row + placed.height..row + initial.height {
                    row_contrib[i][col] = Some(-1);
                }
            }
        }

        // Literal content pins its own row and column.
        let own_coords = cells
            .iter()
            .map(|cell| (cell.row, cell.col))
            .chain(func_cells.iter().map(|cell| (cell.row, cell.col)));
        for (row, col) in own_coords {
            row_contrib[row][col] = Some(row_contrib[row][col].unwrap_or(0).max(0));
            col_contrib[col][row] = Some(col_contrib[col][row].unwrap_or(0).max(0));
        }

        let row_offsets = accumulate(collapse(row_contrib));
        let col_offsets = accumulate(collapse(col_contrib));

        let mut final_cells: BTreeMap<(usize, usize), Vec<Cell>> = BTreeMap::new();
        let mut final_func_cells: BTreeMap<(usize, usize), Vec<FuncCell>> = BTreeMap::new();
        let mut final_merges = Vec::new();

        for ((anchor_row, anchor_col), _, result) in children {
            let delta_rows = anchor_row as isize + row_offsets[anchor_row];
            let delta_cols = anchor_col as isize + col_offsets[anchor_col];
            for ((row, col), placed) in result.cells {
                let entry = final_cells
                    .entry((anchor_row + row, anchor_col + col))
                    .or_default();
                for mut cell in placed {
                    cell.translate(delta_rows, delta_cols);
                    entry.push(cell);
                }
            }
            for ((row, col), placed) in result.func_cells {
                let entry = final_func_cells
                    .entry((anchor_row + row, anchor_col + col))
                    .or_default();
                for mut cell in placed {
                    cell.translate(delta_rows, delta_cols);
                    entry.push(cell);
                }
            }
            for mut merge in result.merges {
                merge.translate(delta_rows, delta_cols);
                final_merges.push(merge);
            }
        }

        for mut cell in cells {
            let key = (cell.row, cell.col);
            cell.translate(row_offsets[key.0], col_offsets[key.1]);
            final_cells.entry(key).or_default().push(cell);
        }
        for mut cell in func_cells {
            let key = (cell.row, cell.col);
            cell.translate(row_offsets[key.0], col_offsets[key.1]);
            final_func_cells.entry(key).or_default().push(cell);
        }
        for mut merge in merges {
            let (row, col) = (merge.row, merge.col);
            merge.translate(row_offsets[row], col_offsets[col]);
            final_merges.push(merge);
        }

        resolve_formula_refs(height, width, &final_cells, &mut final_func_cells);

        let size = bounding_size(&final_cells, &final_func_cells);
        FinalResult {
            cells: final_cells,
            func_cells: final_func_cells,
            merges: final_merges,
            size,
        }
    }
}

/// Resolve formula references whose target template coordinate lies inside
/// this region's bounds, matching them against every cell placed for that
/// coordinate.
fn resolve_formula_refs(
    height: usize,
    width: usize,
    final_cells: &BTreeMap<(usize, usize), Vec<Cell>>,
    final_func_cells: &mut BTreeMap<(usize, usize), Vec<FuncCell>>,
) {
    let mut positions: BTreeMap<(usize, usize), Vec<(usize, usize)>> = BTreeMap::new();
    for (key, placed) in final_cells {
        positions
            .entry(*key)
            .or_default()
            .extend(placed.iter().map(|cell| (cell.row, cell.col)));
    }
    for (key, placed) in final_func_cells.iter() {
        positions
            .entry(*key)
            .or_default()
            .extend(placed.iter().map(|cell| (cell.row, cell.col)));
    }

    for (&(row, col), placed) in final_func_cells.iter_mut() {
        let Some(first) = placed.first() else { continue };
        let in_bounds: Vec<((usize, usize), (isize, isize))> = first
            .pending_refs()
            .into_iter()
            .filter(|(_, (delta_row, delta_col))| {
                let target_row = row as isize + delta_row;
                let target_col = col as isize + delta_col;
                (0..height as isize).contains(&target_row)
                    && (0..width as isize).contains(&target_col)
            })
            .collect();
        for (span, template_cell) in in_bounds {
            let target = (
                (row as isize + template_cell.0) as usize,
                (col as isize + template_cell.1) as usize,
            );
            let matched = positions.get(&target).cloned().unwrap_or_default();
            for cell in placed.iter_mut() {
                cell.finalize_ref(span, template_cell, &matched);
            }
        }
    }
}

fn bounding_size(
    cells: &BTreeMap<(usize, usize), Vec<Cell>>,
    func_cells: &BTreeMap<(usize, usize), Vec<FuncCell>>,
) -> Size {
    let mut last = (-1isize, -1isize);
    for cell in cells.values().flatten() {
        last.0 = last.0.max(cell.row as isize);
        last.1 = last.1.max(cell.col as isize);
    }
    for cell in func_cells.values().flatten() {
        last.0 = last.0.max(cell.row as isize);
        last.1 = last.1.max(cell.col as isize);
    }
    Size::new((last.0 + 1) as usize, (last.1 + 1) as usize)
}

/// Reduce per-coordinate contributions to one delta per row or column: the
/// maximum of the present values, or zero when nothing claimed the slot.
fn collapse(grid: Vec<Vec<Option<isize>>>) -> Vec<isize> {
    grid.into_iter()
        .map(|slot| slot.into_iter().flatten().max().unwrap_or(0))
        .collect()
}

/// Inclusive prefix sums.
fn accumulate(mut deltas: Vec<isize>) -> Vec<isize> {
    let mut total = 0;
    for delta in &mut deltas {
        total += *delta;
        *delta = total;
    }
    deltas
}

/// Iterations of one loop, stacked along its axis in iteration order.
#[derive(Debug)]
pub struct LoopCellGroup {
    pub initial_size: Size,
    direction: LoopDirection,
    groups: Vec<CellGroup>,
}

impl LoopCellGroup {
    pub fn new(initial_size: Size, direction: LoopDirection) -> LoopCellGroup {
        LoopCellGroup {
            initial_size,
            direction,
            groups: Vec::new(),
        }
    }

    pub fn add_group(&mut self, group: CellGroup) {
        self.groups.push(group);
    }

    fn into_final(self) -> FinalResult {
        let results: Vec<FinalResult> = self.groups.into_iter().map(CellGroup::into_final).collect();

        let mut row_steps = vec![0isize];
        let mut col_steps = vec![0isize];
        match self.direction {
            LoopDirection::Down => {
                for result in &results {
                    row_steps.push(result.size.height as isize);
                }
                col_steps = vec![0; row_steps.len()];
            }
            LoopDirection::Right => {
                for result in &results {
                    col_steps.push(result.size.width as isize);
                }
                row_steps = vec![0; col_steps.len()];
            }
        }
        let row_offsets = accumulate(row_steps);
        let col_offsets = accumulate(col_steps);

        let mut final_cells: BTreeMap<(usize, usize), Vec<Cell>> = BTreeMap::new();
        let mut final_func_cells: BTreeMap<(usize, usize), Vec<FuncCell>> = BTreeMap::new();
        let mut final_merges = Vec::new();

        for (index, result) in results.into_iter().enumerate() {
            let delta_rows = row_offsets[index];
            let delta_cols = col_offsets[index];
            for (key, placed) in result.cells {
                let entry = final_cells.entry(key).or_default();
                for mut cell in placed {
                    cell.translate(delta_rows, delta_cols);
                    entry.push(cell);
                }
            }
            for (key, placed) in result.func_cells {
                let entry = final_func_cells.entry(key).or_default();
                for mut cell in placed {
                    cell.translate(delta_rows, delta_cols);
                    entry.push(cell);
                }
            }
            for mut merge in result.merges {
                merge.translate(delta_rows, delta_cols);
                final_merges.push(merge);
            }
        }

        let size = bounding_size(&final_cells, &final_func_cells);
        FinalResult {
            cells: final_cells,
            func_cells: final_func_cells,
            merges: final_merges,
            size,
        }
    }
}

/// A sheet's root region.
///
/// Finalizing applies the one-cell framing shift in both directions and
/// converts formula cells to plain cells with their finalized text.
#[derive(Debug)]
pub struct SheetGroup {
    group: CellGroup,
}

/// Flat output of a finalized sheet.
#[derive(Debug)]
pub struct SheetResult {
    pub cells: Vec<Cell>,
    pub merges: Vec<Merge>,
    pub size: Size,
}

impl SheetGroup {
    pub fn new(group: CellGroup) -> SheetGroup {
        SheetGroup { group }
    }

    pub fn into_final(self) -> SheetResult {
        let result = self.group.into_final();
        let mut cells: Vec<Cell> = result.cells.into_values().flatten().collect();
        let mut func_cells: Vec<FuncCell> = result.func_cells.into_values().flatten().collect();
        let mut merges = result.merges;

        for cell in &mut cells {
            cell.translate(1, 1);
        }
        for cell in &mut func_cells {
            cell.translate(1, 1);
        }
        for merge in &mut merges {
            merge.translate(1, 1);
        }

        for cell in func_cells {
            let value = cell.final_value();
            cells.push(Cell::new(
                cell.row,
                cell.col,
                cell.style,
                value,
                cell.row_height,
                cell.col_width,
            ));
        }

        SheetResult {
            cells,
            merges,
            size: Size::new(result.size.height + 1, result.size.width + 1),
        }
    }
}

impl SheetResult {
    /// Rows-by-columns grid of values for inspection; empty positions are
    /// null.
    pub fn grid(&self) -> Vec<Vec<Value>> {
        let mut out = vec![vec![Value::Null; self.size.width]; self.size.height];
        for cell in &self.cells {
            out[cell.row][cell.col] = cell.value.clone();
        }
        out
    }
}
