//! `each`: renders its area once per item of a collection.
//!
//! Placement is either directional (steps stacked DOWN or to the RIGHT of each other) or
//! delegated to a [`CellRefGenerator`]. Filtered-out items consume no space.

use super::{Command, ensure_area_capacity};
use crate::area::Area;
use crate::config::OverlapPolicy;
use crate::context::Context;
use crate::error::{Result, TemplateError};
use crate::expression::{compare_values, sort_order};
use crate::grid::{AreaRef, CellRef, Size};
use crate::transform::Transformer;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::cmp::Ordering;
use std::fmt;
use strum::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Direction {
    #[default]
    Down,
    Right,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Custom placement: the target cell of the `index`-th rendered step.
pub trait CellRefGenerator {
    fn generate_cell_ref(&self, index: usize, context: &Context) -> CellRef;
}

impl<F> CellRefGenerator for F
where
    F: Fn(usize, &Context) -> CellRef,
{
    fn generate_cell_ref(&self, index: usize, context: &Context) -> CellRef {
        self(index, context)
    }
}

pub struct EachCommand {
    var: String,
    items: String,
    select: Option<String>,
    var_index: Option<String>,
    order_by: Option<String>,
    group_by: Option<String>,
    group_order: Option<SortOrder>,
    direction: Direction,
    cell_ref_generator: Option<Box<dyn CellRefGenerator>>,
    area: Option<Area>,
}

impl EachCommand {
    /// `var` receives each element of the collection `items` evaluates to.
    pub fn new(var: impl Into<String>, items: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            items: items.into(),
            select: None,
            var_index: None,
            order_by: None,
            group_by: None,
            group_order: None,
            direction: Direction::Down,
            cell_ref_generator: None,
            area: None,
        }
    }

    pub fn with_area(mut self, area: Area) -> Result<Self> {
        self.add_area(area)?;
        Ok(self)
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn with_var_index(mut self, name: impl Into<String>) -> Self {
        self.var_index = Some(name.into());
        self
    }

    /// `"e.name ASC, e.payment DESC"`; properties may omit the `var.` prefix.
    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_group_by(mut self, group_by: impl Into<String>, order: Option<SortOrder>) -> Self {
        self.group_by = Some(group_by.into());
        self.group_order = order;
        self
    }

    pub fn with_cell_ref_generator<G: CellRefGenerator + 'static>(mut self, generator: G) -> Self {
        self.cell_ref_generator = Some(Box::new(generator));
        self
    }

    pub fn var(&self) -> &str {
        &self.var
    }

    pub fn items(&self) -> &str {
        &self.items
    }

    pub fn select(&self) -> Option<&str> {
        self.select.as_deref()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn set_select(&mut self, select: Option<String>) {
        self.select = select;
    }

    pub fn set_cell_ref_generator(&mut self, generator: Option<Box<dyn CellRefGenerator>>) {
        self.cell_ref_generator = generator;
    }

    fn items_collection(&self, context: &Context) -> Result<Vec<Value>> {
        match context.evaluate(&self.items)? {
            Value::Array(items) => Ok(items),
            other => {
                tracing::debug!(items = %self.items, value = %other, "each items did not evaluate to a collection");
                Err(TemplateError::configuration(
                    "items expression is not a collection",
                ))
            }
        }
    }

    /// Expression for an item property, adding the `var.` prefix when it is missing.
    fn item_expression(&self, property: &str) -> String {
        let property = property.trim();
        if property == self.var
            || property.starts_with(&format!("{}.", self.var))
            || property.starts_with(&format!("{}[", self.var))
        {
            property.to_string()
        } else {
            format!("{}.{}", self.var, property)
        }
    }

    fn sort_items(&self, items: Vec<Value>, order_by: &str, context: &mut Context) -> Result<Vec<Value>> {
        let mut keys_spec = Vec::new();
        for part in order_by.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let mut tokens = part.split_whitespace();
            let property = tokens.next().unwrap_or_default();
            let order = match tokens.next() {
                Some(order) => order.parse::<SortOrder>().map_err(|_| {
                    TemplateError::configuration(format!("invalid sort order in orderBy: {part}"))
                })?,
                None => SortOrder::Asc,
            };
            keys_spec.push((self.item_expression(property), order));
        }

        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let scope = context.scoped(self.var.clone(), item.clone());
            let keys = keys_spec
                .iter()
                .map(|(expression, _)| scope.evaluate(expression))
                .collect::<Result<Vec<_>>>()?;
            drop(scope);
            keyed.push((keys, item));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            for ((left, right), (_, order)) in a.iter().zip(b).zip(&keys_spec) {
                let ordering = sort_order(left, right);
                let ordering = match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        Ok(keyed.into_iter().map(|(_, item)| item).collect())
    }

    /// Groups selected items by key in first-appearance order. Each group becomes
    /// `{"item": <first item>, "items": [...]}`.
    fn group_items(&self, items: Vec<Value>, group_by: &str, context: &mut Context) -> Result<Vec<Value>> {
        let key_expression = self.item_expression(group_by);
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();

        for item in items {
            let scope = context.scoped(self.var.clone(), item.clone());
            if let Some(select) = &self.select
                && !scope.is_condition_true(select)?
            {
                continue;
            }
            let key = scope.evaluate(&key_expression)?;
            drop(scope);

            match groups
                .iter_mut()
                .find(|(existing, _)| same_key(existing, &key))
            {
                Some((_, members)) => members.push(item),
                None => groups.push((key, vec![item])),
            }
        }

        if let Some(order) = self.group_order {
            groups.sort_by(|(a, _), (b, _)| {
                let ordering = sort_order(a, b);
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        Ok(groups
            .into_iter()
            .map(|(_, members)| {
                let first = members.first().cloned().unwrap_or(Value::Null);
                json!({ "item": first, "items": members })
            })
            .collect())
    }
}

impl Command for EachCommand {
    fn name(&self) -> &str {
        "each"
    }

    fn areas(&self) -> &[Area] {
        self.area.as_slice()
    }

    fn add_area(&mut self, area: Area) -> Result<()> {
        ensure_area_capacity(self.name(), self.areas().len(), 1)?;
        self.area = Some(area);
        Ok(())
    }

    fn apply_at(
        &self,
        cell: &CellRef,
        context: &mut Context,
        transformer: &mut dyn Transformer,
    ) -> Result<Size> {
        let area = self
            .area
            .as_ref()
            .ok_or_else(|| TemplateError::configuration("'each' command has no area"))?;

        let mut items = self.items_collection(context)?;
        if let Some(order_by) = &self.order_by {
            items = self.sort_items(items, order_by, context)?;
        }
        let grouped = match &self.group_by {
            Some(group_by) => {
                items = self.group_items(items, group_by, context)?;
                true
            }
            None => false,
        };

        let mut cursor = Cursor::start(self, area, cell, context, !grouped);
        let mut rendered = 0usize;
        for (position, item) in items.into_iter().enumerate() {
            if cursor
                .render_item(item, position, context, transformer)?
                .is_some()
            {
                rendered += 1;
            }
        }

        let size = cursor.size();
        tracing::debug!(
            command = "each",
            var = %self.var,
            items = %self.items,
            rendered,
            size = %size,
            "each command applied"
        );
        Ok(size)
    }
}

impl fmt::Debug for EachCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EachCommand")
            .field("var", &self.var)
            .field("items", &self.items)
            .field("select", &self.select)
            .field("var_index", &self.var_index)
            .field("order_by", &self.order_by)
            .field("group_by", &self.group_by)
            .field("group_order", &self.group_order)
            .field("direction", &self.direction)
            .field("cell_ref_generator", &self.cell_ref_generator.is_some())
            .field("area", &self.area)
            .finish()
    }
}

fn same_key(left: &Value, right: &Value) -> bool {
    left == right || compare_values(left, right) == Some(Ordering::Equal)
}

/// Running placement state of one `apply_at` call.
struct Cursor<'a> {
    command: &'a EachCommand,
    area: &'a Area,
    /// `select` is applied per step; grouped collections were filtered up front.
    filter: bool,
    current: CellRef,
    index: usize,
    width: u32,
    height: u32,
    placed: Vec<AreaRef>,
}

impl<'a> Cursor<'a> {
    fn start(
        command: &'a EachCommand,
        area: &'a Area,
        cell: &CellRef,
        context: &Context,
        filter: bool,
    ) -> Self {
        let current = match &command.cell_ref_generator {
            Some(generator) => generator.generate_cell_ref(0, context),
            None => cell.clone(),
        };
        Self {
            command,
            area,
            filter,
            current,
            index: 0,
            width: 0,
            height: 0,
            placed: Vec::new(),
        }
    }

    /// Binds the item (and index) and renders one step. `None` when the item was filtered out.
    fn render_item(
        &mut self,
        item: Value,
        position: usize,
        context: &mut Context,
        transformer: &mut dyn Transformer,
    ) -> Result<Option<Size>> {
        let command = self.command;
        let mut scope = context.scoped(command.var.clone(), item);
        match &command.var_index {
            Some(index_var) => {
                let mut indexed = scope.scoped(index_var.clone(), position);
                self.render_bound(&mut indexed, transformer)
            }
            None => self.render_bound(&mut scope, transformer),
        }
    }

    fn render_bound(
        &mut self,
        context: &mut Context,
        transformer: &mut dyn Transformer,
    ) -> Result<Option<Size>> {
        if self.filter
            && let Some(select) = &self.command.select
            && !context.is_condition_true(select)?
        {
            return Ok(None);
        }
        let step = self.area.apply_at(&self.current, context, transformer)?;
        tracing::trace!(var = %self.command.var, cell = %self.current, size = %step, "each step rendered");
        self.advance(step, context)?;
        Ok(Some(step))
    }

    fn advance(&mut self, step: Size, context: &Context) -> Result<()> {
        self.index += 1;
        let command = self.command;
        match (&command.cell_ref_generator, command.direction) {
            (Some(generator), _) => {
                self.check_overlap(step, context)?;
                self.width = self.width.max(step.width);
                self.height = self.height.max(step.height);
                self.current = generator.generate_cell_ref(self.index, context);
            }
            (None, Direction::Down) => {
                self.current = self.current.offset(step.height, 0);
                self.width = self.width.max(step.width);
                self.height = self.height.saturating_add(step.height);
            }
            (None, Direction::Right) => {
                self.current = self.current.offset(0, step.width);
                self.width = self.width.saturating_add(step.width);
                self.height = self.height.max(step.height);
            }
        }
        Ok(())
    }

    fn check_overlap(&mut self, step: Size, context: &Context) -> Result<()> {
        let policy = context.config().overlap_policy;
        if policy == OverlapPolicy::Ignore || step.is_empty() {
            return Ok(());
        }
        let region = AreaRef::from_size(&self.current, step)?;
        if self.placed.iter().any(|previous| previous.intersects(&region)) {
            let step_index = self.index - 1;
            match policy {
                OverlapPolicy::Fail => {
                    return Err(TemplateError::Overlap {
                        index: step_index,
                        cell: self.current.to_string(),
                    });
                }
                _ => tracing::warn!(
                    step = step_index,
                    region = %region,
                    "generated cell reference overlaps a previous step"
                ),
            }
        }
        self.placed.push(region);
        Ok(())
    }

    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{CellValue, MemoryGrid};
    use assert_matches::assert_matches;

    fn grid() -> MemoryGrid {
        MemoryGrid::from_cells("S", [("A1", "${e.name}"), ("B1", "${e.payment}")]).unwrap()
    }

    fn employees() -> Value {
        json!([
            {"name": "Elsa", "payment": 1500, "dept": "IT"},
            {"name": "Oleg", "payment": 2300, "dept": "HR"},
            {"name": "Neil", "payment": 2500, "dept": "IT"},
            {"name": "Maria", "payment": 1700, "dept": "HR"}
        ])
    }

    fn each() -> EachCommand {
        EachCommand::new("e", "employees")
            .with_area(Area::parse("A1:B1", "S").unwrap())
            .unwrap()
    }

    fn rendered_names(grid: &MemoryGrid) -> Vec<(u32, u32, String)> {
        grid.writes()
            .iter()
            .filter(|w| w.cell.col == 0 || w.cell.row == 0)
            .filter_map(|w| w.value.as_text().map(|t| (w.cell.row, w.cell.col, t.to_string())))
            .collect()
    }

    #[test]
    fn test_direction_parses_case_insensitively() {
        assert_eq!("right".parse::<Direction>().unwrap(), Direction::Right);
        assert_eq!("DOWN".parse::<Direction>().unwrap(), Direction::Down);
        assert_eq!(Direction::Right.to_string(), "RIGHT");
        assert_eq!("Desc".parse::<SortOrder>().unwrap(), SortOrder::Desc);
    }

    #[test]
    fn test_var_index_is_bound_and_released() {
        let mut grid =
            MemoryGrid::from_cells("S", [("A1", "${i}: ${e.name}")]).unwrap();
        let command = EachCommand::new("e", "employees")
            .with_var_index("i")
            .with_area(Area::parse("A1", "S").unwrap())
            .unwrap();
        let mut context = Context::from_vars([("employees", employees())]);

        command
            .apply_at(&CellRef::new("S", 0, 0), &mut context, &mut grid)
            .unwrap();

        assert_eq!(grid.value_at("A2", "S"), Some(&CellValue::text("1: Oleg")));
        assert_eq!(context.var_names(), vec!["employees".to_string()]);
    }

    #[test]
    fn test_order_by_sorts_before_rendering() {
        let mut grid = grid();
        let command = each().with_order_by("payment DESC");
        let mut context = Context::from_vars([("employees", employees())]);

        command
            .apply_at(&CellRef::new("S", 0, 0), &mut context, &mut grid)
            .unwrap();

        let names: Vec<String> = rendered_names(&grid).into_iter().map(|(_, _, n)| n).collect();
        assert_eq!(names, vec!["Neil", "Oleg", "Maria", "Elsa"]);
    }

    fn payments_column(grid: &MemoryGrid) -> Vec<Option<f64>> {
        grid.writes()
            .iter()
            .filter(|w| w.cell.col == 1)
            .map(|w| match w.value {
                CellValue::Number(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_order_by_ranks_missing_keys_first() {
        let items: Vec<Value> = (0..60u32)
            .map(|i| {
                if i % 3 == 0 {
                    json!({ "name": format!("n{i}") })
                } else {
                    json!({ "name": format!("n{i}"), "payment": (i * 37) % 101 })
                }
            })
            .collect();
        let mut present: Vec<f64> = items
            .iter()
            .filter_map(|item| item["payment"].as_f64())
            .collect();
        present.sort_by(f64::total_cmp);

        let mut ascending = grid();
        let mut descending = grid();
        let mut context = Context::from_vars([("employees", Value::Array(items))]);
        each()
            .with_order_by("payment ASC")
            .apply_at(&CellRef::new("S", 0, 0), &mut context, &mut ascending)
            .unwrap();
        let mut expected: Vec<Option<f64>> = vec![None; 20];
        expected.extend(present.iter().copied().map(Some));
        assert_eq!(payments_column(&ascending), expected);

        each()
            .with_order_by("payment DESC")
            .apply_at(&CellRef::new("S", 0, 0), &mut context, &mut descending)
            .unwrap();
        let mut expected: Vec<Option<f64>> = present.iter().rev().copied().map(Some).collect();
        expected.extend(vec![None; 20]);
        assert_eq!(payments_column(&descending), expected);
    }

    #[test]
    fn test_invalid_sort_order_is_configuration_error() {
        let mut grid = grid();
        let command = each().with_order_by("e.name SIDEWAYS");
        let mut context = Context::from_vars([("employees", employees())]);
        assert_matches!(
            command.apply_at(&CellRef::new("S", 0, 0), &mut context, &mut grid),
            Err(TemplateError::Configuration { .. })
        );
    }

    #[test]
    fn test_group_by_binds_group_objects() {
        let mut grid = MemoryGrid::from_cells(
            "S",
            [("A1", "${g.item.dept}"), ("B1", "${size(g.items)}")],
        )
        .unwrap();
        let command = EachCommand::new("g", "employees")
            .with_group_by("dept", Some(SortOrder::Asc))
            .with_select("g.payment > 1600")
            .with_area(Area::parse("A1:B1", "S").unwrap())
            .unwrap();
        let mut context = Context::from_vars([("employees", employees())]);

        let size = command
            .apply_at(&CellRef::new("S", 0, 0), &mut context, &mut grid)
            .unwrap();

        assert_eq!(size, Size::new(2, 2));
        assert_eq!(grid.value_at("A1", "S"), Some(&CellValue::text("HR")));
        assert_eq!(grid.value_at("B1", "S"), Some(&CellValue::Number(2.0)));
        assert_eq!(grid.value_at("A2", "S"), Some(&CellValue::text("IT")));
        assert_eq!(grid.value_at("B2", "S"), Some(&CellValue::Number(1.0)));
    }

    #[test]
    fn test_missing_area_is_configuration_error() {
        let command = EachCommand::new("e", "employees");
        let mut context = Context::from_vars([("employees", employees())]);
        assert_matches!(
            command.apply_at(&CellRef::new("S", 0, 0), &mut context, &mut grid()),
            Err(TemplateError::Configuration { message }) if message.contains("no area")
        );
    }

    #[test]
    fn test_overlap_policy_fail_detects_generator_overlap() {
        use crate::context::ContextConfig;

        let mut grid = grid();
        let command = each().with_cell_ref_generator(|_index: usize, _: &Context| CellRef::new("S", 0, 0));
        let mut context = Context::from_vars([("employees", employees())]).with_config(ContextConfig {
            overlap_policy: OverlapPolicy::Fail,
        });

        assert_matches!(
            command.apply_at(&CellRef::new("S", 0, 0), &mut context, &mut grid),
            Err(TemplateError::Overlap { index: 1, .. })
        );
        assert_eq!(context.var_names(), vec!["employees".to_string()]);
    }

    #[test]
    fn test_overlap_policy_ignore_renders_over_previous_steps() {
        let mut grid = grid();
        let command = each().with_cell_ref_generator(|_index: usize, _: &Context| CellRef::new("S", 5, 5));
        let mut context = Context::from_vars([("employees", employees())]);

        let size = command
            .apply_at(&CellRef::new("S", 0, 0), &mut context, &mut grid)
            .unwrap();

        assert_eq!(size, Size::new(2, 1));
        assert_eq!(grid.value_at("F6", "S"), Some(&CellValue::text("Maria")));
    }
}
