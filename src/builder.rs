//! Builds the area/command tree from `jx:` markup stored in cell comments.
//!
//! ```text
//! jx:area(lastCell="D10")
//! jx:each(items="employees" var="e" lastCell="C2" direction="RIGHT" select="e.payment > 2000")
//! jx:if(condition="e.active" lastCell="C2" areas=["A2:C2","A3:C3"])
//! jx:mergeCells(lastCell="A2" rows="2")
//! ```
//!
//! The markup cell is the command's top-left corner and `lastCell` its bottom-right corner.
//! Every command nests into the smallest enclosing area: a root `jx:area`, or an area of
//! another command.

use crate::area::Area;
use crate::command::{Command, Direction, EachCommand, IfCommand, MergeCellsCommand, SortOrder};
use crate::error::{Result, TemplateError};
use crate::grid::{AreaRef, CellRef};
use crate::transform::Transformer;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

const MARKUP_PREFIX: &str = "jx:";
const AREA_COMMAND: &str = "area";
const LAST_CELL_ATTR: &str = "lastCell";
const AREAS_ATTR: &str = "areas";

static COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^jx:([A-Za-z][A-Za-z0-9_]*)\s*\((.*)\)\s*$").expect("command pattern is valid")
});
static ATTRIBUTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z][A-Za-z0-9_]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|\[([^\]]*)\])"#)
        .expect("attribute pattern is valid")
});
static QUOTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)"|'([^']*)'"#).expect("quoted pattern is valid"));

/// One parsed `jx:` line.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMarkup {
    pub name: String,
    pub cell: CellRef,
    pub last_cell: CellRef,
    pub attributes: IndexMap<String, String>,
    pub areas: Vec<AreaRef>,
}

impl CommandMarkup {
    /// Rectangle from the markup cell to `lastCell`.
    pub fn region(&self) -> Result<AreaRef> {
        AreaRef::new(self.cell.clone(), self.last_cell.clone())
            .map_err(|err| TemplateError::markup(&self.cell, err.to_string()))
    }

    /// Areas handed to the command: the `areas` list, or the command region itself.
    pub fn command_areas(&self) -> Result<Vec<AreaRef>> {
        if self.areas.is_empty() {
            Ok(vec![self.region()?])
        } else {
            Ok(self.areas.clone())
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn required(&self, name: &str) -> Result<&str> {
        self.attr(name).ok_or_else(|| {
            TemplateError::markup(
                &self.cell,
                format!("missing required attribute '{name}' for 'jx:{}'", self.name),
            )
        })
    }

    fn parsed<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.attr(name)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|_| {
                    TemplateError::markup(
                        &self.cell,
                        format!("invalid value '{raw}' for attribute '{name}'"),
                    )
                })
            })
            .transpose()
    }
}

/// Parses every `jx:` line of a comment anchored at `cell`. Other lines are ignored.
pub fn parse_markup(text: &str, cell: &CellRef) -> Result<Vec<CommandMarkup>> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with(MARKUP_PREFIX))
        .map(|line| parse_line(line, cell))
        .collect()
}

fn parse_line(line: &str, cell: &CellRef) -> Result<CommandMarkup> {
    let caps = COMMAND_RE
        .captures(line)
        .ok_or_else(|| TemplateError::markup(cell, format!("malformed command markup: {line}")))?;
    let name = caps[1].to_string();
    let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

    let mut attributes = IndexMap::new();
    let mut areas = Vec::new();
    let mut last = 0;
    for attr in ATTRIBUTE_RE.captures_iter(body) {
        let Some(whole) = attr.get(0) else {
            continue;
        };
        ensure_separator(&body[last..whole.start()], line, cell)?;
        last = whole.end();

        let key = attr[1].to_string();
        if let Some(list) = attr.get(4) {
            if key != AREAS_ATTR {
                return Err(TemplateError::markup(
                    cell,
                    format!("attribute '{key}' does not accept a list"),
                ));
            }
            for quoted in QUOTED_RE.captures_iter(list.as_str()) {
                let reference = quoted
                    .get(1)
                    .or_else(|| quoted.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                areas.push(AreaRef::parse(reference, &cell.sheet)?);
            }
            continue;
        }
        let value = attr
            .get(2)
            .or_else(|| attr.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        attributes.insert(key, value);
    }
    ensure_separator(&body[last..], line, cell)?;

    let last_cell = match attributes.get(LAST_CELL_ATTR) {
        Some(reference) => CellRef::parse(reference, &cell.sheet)?,
        None => {
            return Err(TemplateError::markup(
                cell,
                format!("missing required attribute '{LAST_CELL_ATTR}' for 'jx:{name}'"),
            ));
        }
    };

    Ok(CommandMarkup {
        name,
        cell: cell.clone(),
        last_cell,
        attributes,
        areas,
    })
}

fn ensure_separator(gap: &str, line: &str, cell: &CellRef) -> Result<()> {
    if gap.chars().all(|c| c.is_whitespace() || c == ',') {
        Ok(())
    } else {
        Err(TemplateError::markup(
            cell,
            format!("unexpected '{}' in command markup: {line}", gap.trim()),
        ))
    }
}

pub type CommandFactory = Box<dyn Fn(&CommandMarkup) -> Result<Box<dyn Command>>>;

/// Maps markup names to command constructors. Factories build the command without areas;
/// the builder attaches them afterwards.
pub struct CommandRegistry {
    factories: HashMap<String, CommandFactory>,
}

impl CommandRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&CommandMarkup) -> Result<Box<dyn Command>> + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn create(&self, markup: &CommandMarkup) -> Result<Box<dyn Command>> {
        let factory = self.factories.get(&markup.name).ok_or_else(|| {
            TemplateError::markup(&markup.cell, format!("unknown command 'jx:{}'", markup.name))
        })?;
        factory(markup)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("each", each_from_markup);
        registry.register("if", |markup: &CommandMarkup| {
            Ok(Box::new(IfCommand::new(markup.required("condition")?)) as Box<dyn Command>)
        });
        registry.register("mergeCells", merge_from_markup);
        registry
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

fn each_from_markup(markup: &CommandMarkup) -> Result<Box<dyn Command>> {
    let mut command = EachCommand::new(markup.required("var")?, markup.required("items")?);
    if let Some(direction) = markup.parsed::<Direction>("direction")? {
        command = command.with_direction(direction);
    }
    if let Some(select) = markup.attr("select") {
        command = command.with_select(select);
    }
    if let Some(var_index) = markup.attr("varIndex") {
        command = command.with_var_index(var_index);
    }
    if let Some(order_by) = markup.attr("orderBy") {
        command = command.with_order_by(order_by);
    }
    if let Some(group_by) = markup.attr("groupBy") {
        let order = markup.parsed::<SortOrder>("groupOrder")?;
        command = command.with_group_by(group_by, order);
    }
    Ok(Box::new(command))
}

fn merge_from_markup(markup: &CommandMarkup) -> Result<Box<dyn Command>> {
    let mut command = MergeCellsCommand::new();
    if let Some(cols) = markup.attr("cols") {
        command = command.with_cols(cols);
    }
    if let Some(rows) = markup.attr("rows") {
        command = command.with_rows(rows);
    }
    if let Some(min_cols) = markup.parsed::<u32>("minCols")? {
        command = command.with_min_cols(min_cols);
    }
    if let Some(min_rows) = markup.parsed::<u32>("minRows")? {
        command = command.with_min_rows(min_rows);
    }
    Ok(Box::new(command))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Container {
    Root(usize),
    /// `(command index, area index)`
    Command(usize, usize),
}

struct Node {
    markup: CommandMarkup,
    region: AreaRef,
    areas: Vec<AreaRef>,
}

#[derive(Debug, Default)]
pub struct AreaBuilder {
    registry: CommandRegistry,
}

impl AreaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: CommandRegistry) -> Self {
        Self { registry }
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    /// Reads the markup from `transformer`'s comments and returns the root areas in
    /// template order. A template without `jx:area` yields no areas.
    pub fn build(&self, transformer: &dyn Transformer) -> Result<Vec<Area>> {
        let mut comments = transformer.comments();
        comments.sort_by(|a, b| a.cell.cmp(&b.cell));

        let mut roots = Vec::new();
        let mut nodes = Vec::new();
        for comment in &comments {
            for markup in parse_markup(&comment.text, &comment.cell)? {
                let region = markup.region()?;
                if markup.name == AREA_COMMAND {
                    roots.push(region);
                } else {
                    if !self.registry.contains(&markup.name) {
                        return Err(TemplateError::markup(
                            &markup.cell,
                            format!("unknown command 'jx:{}'", markup.name),
                        ));
                    }
                    let areas = markup.command_areas()?;
                    nodes.push(Node {
                        markup,
                        region,
                        areas,
                    });
                }
            }
        }

        if roots.is_empty() {
            if !nodes.is_empty() {
                tracing::warn!(commands = nodes.len(), "template has commands but no jx:area");
            } else {
                tracing::warn!("template has no jx:area markup");
            }
            return Ok(Vec::new());
        }

        let mut children: HashMap<Container, Vec<usize>> = HashMap::new();
        for (index, node) in nodes.iter().enumerate() {
            let parent = parent_of(index, node, &roots, &nodes).ok_or_else(|| {
                TemplateError::markup(
                    &node.markup.cell,
                    format!(
                        "'jx:{}' command region {} is not inside any jx:area",
                        node.markup.name, node.region
                    ),
                )
            })?;
            children.entry(parent).or_default().push(index);
        }

        let mut built = HashSet::new();
        let areas = roots
            .iter()
            .enumerate()
            .map(|(index, region)| {
                self.materialize(region, Container::Root(index), &nodes, &children, &mut built)
            })
            .collect::<Result<Vec<_>>>()?;
        if let Some(orphan) = (0..nodes.len()).find(|index| !built.contains(index)) {
            return Err(TemplateError::markup(
                &nodes[orphan].markup.cell,
                "command areas contain each other",
            ));
        }
        tracing::debug!(areas = areas.len(), commands = nodes.len(), "built template areas");
        Ok(areas)
    }

    fn materialize(
        &self,
        region: &AreaRef,
        container: Container,
        nodes: &[Node],
        children: &HashMap<Container, Vec<usize>>,
        built: &mut HashSet<usize>,
    ) -> Result<Area> {
        let mut area = Area::new(region.clone());
        for &index in children.get(&container).map(Vec::as_slice).unwrap_or_default() {
            let node = &nodes[index];
            built.insert(index);
            let mut command = self.registry.create(&node.markup)?;
            for (area_index, command_area) in node.areas.iter().enumerate() {
                let nested = self.materialize(
                    command_area,
                    Container::Command(index, area_index),
                    nodes,
                    children,
                    built,
                )?;
                command
                    .add_area(nested)
                    .map_err(|err| TemplateError::markup(&node.markup.cell, err.to_string()))?;
            }
            area.add_boxed_command(node.region.clone(), command)
                .map_err(|err| TemplateError::markup(&node.markup.cell, err.to_string()))?;
        }
        Ok(area)
    }
}

/// Smallest container holding `node`. An area identical to the command region only
/// qualifies when its owner was declared earlier; ties go to the latest declaration.
fn parent_of(index: usize, node: &Node, roots: &[AreaRef], nodes: &[Node]) -> Option<Container> {
    let mut best: Option<(u64, Option<usize>, Container)> = None;
    let mut consider = |cells: u64, owner: Option<usize>, container: Container| {
        let better = match &best {
            None => true,
            Some((best_cells, best_owner, _)) => {
                cells < *best_cells || (cells == *best_cells && owner > *best_owner)
            }
        };
        if better {
            best = Some((cells, owner, container));
        }
    };

    for (root_index, root) in roots.iter().enumerate() {
        if root.contains_area(&node.region) {
            consider(root.cell_count(), None, Container::Root(root_index));
        }
    }
    for (other_index, other) in nodes.iter().enumerate() {
        if other_index == index {
            continue;
        }
        for (area_index, area) in other.areas.iter().enumerate() {
            if !area.contains_area(&node.region) {
                continue;
            }
            if *area == node.region && other_index > index {
                continue;
            }
            consider(
                area.cell_count(),
                Some(other_index),
                Container::Command(other_index, area_index),
            );
        }
    }
    best.map(|(_, _, container)| container)
}
