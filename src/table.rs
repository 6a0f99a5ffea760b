//! Tabular data compiler: `.csv` spreadsheet → indexed data library.
//!
//! Row 1 holds one column schema per cell, row 2 the column names and every
//! following non-empty row one record. Values are stored in a private
//! hashtable keyed by row id and a packed per-column offset; index groups
//! map a value to the ordered list of rows holding it.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::rc::Rc;
use tracing::debug;

use crate::alias::IDENT_RE;
use crate::discovery::unit_name;
use crate::error::{
    Result, SyntaxError, ERR_TABLE_BOUND, ERR_TABLE_NULL, ERR_TABLE_SCHEMA, ERR_TABLE_SHAPE,
    ERR_TABLE_UNIQUE, ERR_TABLE_VALUE,
};
use crate::line::{indent_for, Line, SourcePos};
use crate::units::LIBS_AGGREGATE;

lazy_static! {
    static ref SCHEMA_RE: Regex =
        Regex::new(r"^\s*(?P<ty>[irbsc])\s*(?:\[\s*(?P<bound>\d+)\s*\])?(?P<flags>.*)$").unwrap();
    static ref FLAG_RE: Regex =
        Regex::new(r"^\s*(?:(?P<unique>!)|(?P<nullable>\?)|#(?P<group>[A-Za-z][A-Za-z0-9_]*)?)").unwrap();
    static ref INTEGER_RE: Regex = Regex::new(r"^-?\d+$").unwrap();
    static ref REAL_RE: Regex = Regex::new(r"^-?(?:\d+(?:\.\d*)?|\.\d+)$").unwrap();
    static ref CODE_RE: Regex =
        Regex::new(r"^(?:'(?P<quoted>[A-Za-z0-9]{4})'|(?P<bare>[A-Za-z0-9]{4}))$").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEMA
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Integer,
    Real,
    Boolean,
    Str,
    Code,
}

impl CellType {
    fn parse(code: &str) -> Option<CellType> {
        match code {
            "i" => Some(CellType::Integer),
            "r" => Some(CellType::Real),
            "b" => Some(CellType::Boolean),
            "s" => Some(CellType::Str),
            "c" => Some(CellType::Code),
            _ => None,
        }
    }

    /// Output-language type of accessor results and group parameters.
    fn type_name(self) -> &'static str {
        match self {
            CellType::Integer | CellType::Code => "integer",
            CellType::Real => "real",
            CellType::Boolean => "boolean",
            CellType::Str => "string",
        }
    }

    fn storage(self) -> &'static str {
        match self {
            CellType::Integer | CellType::Code => "Integer",
            CellType::Real => "Real",
            CellType::Boolean => "Boolean",
            CellType::Str => "Str",
        }
    }

    fn default_value(self) -> &'static str {
        match self {
            CellType::Integer | CellType::Code => "0",
            CellType::Real => "0.0",
            CellType::Boolean => "false",
            CellType::Str => "null",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: CellType,
    /// `Some(bound)` for list columns.
    pub list: Option<usize>,
    pub unique: bool,
    pub nullable: bool,
    pub groups: Vec<String>,
}

impl Column {
    fn accessor(&self) -> String {
        capitalize(&self.name)
    }

    fn constant(&self) -> String {
        self.name.to_uppercase()
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Parse one header cell; bare `#` groups are resolved once names are known.
fn parse_schema(cell: &str) -> std::result::Result<(CellType, Option<usize>, bool, bool, Vec<Option<String>>), String> {
    let caps = SCHEMA_RE
        .captures(cell)
        .ok_or_else(|| format!("Malformed column schema \"{}\"", cell.trim()))?;
    let ty = CellType::parse(&caps["ty"]).ok_or_else(|| format!("Unknown column type \"{}\"", &caps["ty"]))?;
    let list = match caps.name("bound") {
        Some(b) => Some(
            b.as_str()
                .parse::<usize>()
                .map_err(|_| format!("Invalid list bound \"{}\"", b.as_str()))?,
        ),
        None => None,
    };

    let mut unique = false;
    let mut nullable = false;
    let mut groups = Vec::new();
    let mut rest = caps.name("flags").map_or("", |m| m.as_str());
    while !rest.trim().is_empty() {
        let flag = FLAG_RE
            .captures(rest)
            .ok_or_else(|| format!("Malformed column flags \"{}\"", rest.trim()))?;
        if flag.name("unique").is_some() {
            unique = true;
        } else if flag.name("nullable").is_some() {
            nullable = true;
        } else {
            groups.push(flag.name("group").map(|g| g.as_str().to_string()));
        }
        rest = &rest[flag.get(0).map_or(rest.len(), |m| m.end())..];
    }
    Ok((ty, list, unique, nullable, groups))
}

fn schema_error(path: &Path, row: u32, message: String) -> SyntaxError {
    SyntaxError::new(ERR_TABLE_SCHEMA, path, Some(row), message)
}

fn parse_columns(path: &Path, schema: &[String], names: &[String]) -> Result<Vec<Column>> {
    if schema.len() != names.len() {
        return Err(schema_error(
            path,
            2,
            format!("{} column schemas but {} column names", schema.len(), names.len()),
        ));
    }

    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(schema.len());
    for (cell, name) in schema.iter().zip(names) {
        let name = name.trim().to_string();
        if !IDENT_RE.is_match(&name) {
            return Err(schema_error(path, 2, format!("Illegal column name \"{}\"", name)));
        }
        if !seen.insert(name.clone()) {
            return Err(schema_error(path, 2, format!("Duplicate column name \"{}\"", name)));
        }
        let (ty, list, unique, nullable, groups) =
            parse_schema(cell).map_err(|msg| schema_error(path, 1, msg))?;
        let groups: Vec<String> = groups
            .into_iter()
            .map(|g| g.unwrap_or_else(|| name.clone()))
            .collect();
        if !groups.is_empty() && ty == CellType::Real {
            return Err(schema_error(path, 1, format!("Real column \"{}\" cannot be indexed", name)));
        }
        if !groups.is_empty() && list.is_some() {
            return Err(schema_error(path, 1, format!("List column \"{}\" cannot be indexed", name)));
        }
        columns.push(Column {
            name,
            ty,
            list,
            unique,
            nullable,
            groups,
        });
    }

    let mut group_types: IndexMap<&str, CellType> = IndexMap::new();
    for column in &columns {
        for group in &column.groups {
            let ty = *group_types.entry(group.as_str()).or_insert(column.ty);
            if ty != column.ty {
                return Err(schema_error(
                    path,
                    1,
                    format!("Index group \"{}\" mixes column types", group),
                ));
            }
        }
    }

    let mut functions = HashSet::from(["Count".to_string()]);
    for column in &columns {
        let mut names = vec![column.accessor()];
        if column.list.is_some() {
            names.push(format!("{}Size", column.accessor()));
        }
        for name in names {
            if !functions.insert(name.clone()) {
                return Err(schema_error(path, 2, format!("Generated accessor \"{}\" collides", name)));
            }
        }
    }
    for group in group_types.keys() {
        for name in [format!("{}Count", capitalize(group)), format!("{}Find", capitalize(group))] {
            if !functions.insert(name.clone()) {
                return Err(schema_error(path, 2, format!("Generated accessor \"{}\" collides", name)));
            }
        }
    }

    // Globals are upper-cased, so names differing only in case clash there.
    let mut globals = HashSet::new();
    for column in &columns {
        if !globals.insert(format!("{}_OFFSET", column.constant())) {
            return Err(schema_error(
                path,
                2,
                format!("Column \"{}\" collides with another column's constants", column.name),
            ));
        }
    }
    for group in group_types.keys() {
        if !globals.insert(format!("IDX_{}", group.to_uppercase())) {
            return Err(schema_error(
                path,
                1,
                format!("Index group \"{}\" collides with another group's index", group),
            ));
        }
    }
    Ok(columns)
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    /// Validated literal text.
    Real(String),
    Boolean(bool),
    Str(String),
    Code(String),
}

impl Value {
    fn parse(ty: CellType, raw: &str) -> Option<Value> {
        match ty {
            CellType::Integer => {
                if !INTEGER_RE.is_match(raw) {
                    return None;
                }
                raw.parse::<i32>().ok().map(Value::Integer)
            }
            CellType::Real => REAL_RE.is_match(raw).then(|| Value::Real(raw.to_string())),
            CellType::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "t" | "1" | "on" | "o" => Some(Value::Boolean(true)),
                "false" | "no" | "n" | "f" | "0" | "off" | "x" => Some(Value::Boolean(false)),
                _ => None,
            },
            CellType::Str => Some(Value::Str(raw.to_string())),
            CellType::Code => CODE_RE.captures(raw).and_then(|caps| {
                caps.name("quoted")
                    .or_else(|| caps.name("bare"))
                    .map(|m| Value::Code(m.as_str().to_string()))
            }),
        }
    }

    /// Output-language literal.
    fn literal(&self) -> String {
        match self {
            Value::Integer(i) => i.to_string(),
            Value::Real(r) => r.clone(),
            Value::Boolean(b) => b.to_string(),
            Value::Str(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Value::Code(c) => format!("'{}'", c),
        }
    }

    /// Parent key expression inside an index hashtable.
    fn index_key(&self) -> String {
        match self {
            Value::Str(_) => format!("StringHash({})", self.literal()),
            Value::Boolean(b) => (if *b { "1" } else { "0" }).to_string(),
            _ => self.literal(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    /// One entry per column and row; an empty vector is a null cell.
    pub rows: Vec<Vec<Vec<Value>>>,
}

impl Table {
    /// Packed width of a column: 1 for scalars, longest observed list otherwise.
    fn width(&self, column: usize) -> usize {
        if self.columns[column].list.is_none() {
            return 1;
        }
        self.rows
            .iter()
            .map(|row| row[column].len())
            .max()
            .unwrap_or(0)
            .max(1)
    }

    fn offsets(&self) -> Vec<(usize, usize)> {
        let mut next = 0;
        (0..self.columns.len())
            .map(|i| {
                let width = self.width(i);
                let slot = (next, width);
                next += width;
                slot
            })
            .collect()
    }

    /// Group name → (value type, value key → ordered row ids).
    fn index_groups(&self) -> IndexMap<String, (CellType, IndexMap<String, Vec<usize>>)> {
        let mut groups: IndexMap<String, (CellType, IndexMap<String, Vec<usize>>)> = IndexMap::new();
        for column in &self.columns {
            for group in &column.groups {
                groups
                    .entry(group.clone())
                    .or_insert_with(|| (column.ty, IndexMap::new()));
            }
        }
        for (row_id, row) in self.rows.iter().enumerate() {
            for (column, cells) in self.columns.iter().zip(row) {
                for group in &column.groups {
                    let Some((_, keys)) = groups.get_mut(group) else {
                        continue;
                    };
                    for value in cells {
                        let ids = keys.entry(value.index_key()).or_default();
                        if ids.last() != Some(&row_id) {
                            ids.push(row_id);
                        }
                    }
                }
            }
        }
        groups
    }
}

fn is_blank(record: &[String]) -> bool {
    record.iter().all(|cell| cell.trim().is_empty())
}

fn parse_cell(column: &Column, raw: &str) -> std::result::Result<Vec<Value>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let items: Vec<&str> = match column.list {
        Some(_) => raw.split('|').map(str::trim).collect(),
        None => vec![raw],
    };
    items
        .into_iter()
        .map(|item| {
            Value::parse(column.ty, item).ok_or_else(|| {
                format!(
                    "Invalid {} value \"{}\" in column \"{}\"",
                    column.ty.type_name(),
                    item,
                    column.name
                )
            })
        })
        .collect()
}

/// Read and validate a spreadsheet.
pub fn parse(path: &Path, source: &str) -> Result<Table> {
    let name = unit_name(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(source.as_bytes());

    // (spreadsheet row, cells); the reader skips fully empty lines.
    let mut records: Vec<(u32, Vec<String>)> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| {
            let line = err.position().map(|p| p.line() as u32);
            SyntaxError::new(ERR_TABLE_SHAPE, path, line, format!("Unreadable spreadsheet: {}", err))
        })?;
        let row = record
            .position()
            .map_or(records.len() as u32 + 1, |p| p.line() as u32);
        records.push((row, record.iter().map(str::to_string).collect()));
    }

    if records.len() < 2 {
        return Err(SyntaxError::new(
            ERR_TABLE_SCHEMA,
            path,
            None,
            "Spreadsheet needs a schema row and a column-name row",
        ));
    }
    let columns = parse_columns(path, &records[0].1, &records[1].1)?;

    let mut seen: Vec<HashSet<String>> = vec![HashSet::new(); columns.len()];
    let mut rows = Vec::new();
    for (row_number, record) in records.iter().skip(2) {
        let row_number = *row_number;
        if is_blank(record) {
            continue;
        }
        let fail = |code: &'static str, message: String| {
            SyntaxError::new(code, path, Some(row_number), message).with_text(record.join(","))
        };
        if record.len() != columns.len() {
            return Err(fail(
                ERR_TABLE_SHAPE,
                format!("Expected {} cells, found {}", columns.len(), record.len()),
            ));
        }

        let mut row = Vec::with_capacity(columns.len());
        for (i, (column, raw)) in columns.iter().zip(record).enumerate() {
            let values = parse_cell(column, raw).map_err(|msg| fail(ERR_TABLE_VALUE, msg))?;
            if values.is_empty() && !column.nullable {
                return Err(fail(ERR_TABLE_NULL, format!("Column \"{}\" cannot be empty", column.name)));
            }
            if let Some(bound) = column.list {
                if values.len() > bound {
                    return Err(fail(
                        ERR_TABLE_BOUND,
                        format!(
                            "Column \"{}\" holds at most {} values, found {}",
                            column.name,
                            bound,
                            values.len()
                        ),
                    ));
                }
            }
            if column.unique && !values.is_empty() {
                let key = values.iter().map(Value::literal).collect::<Vec<_>>().join("|");
                if !seen[i].insert(key.clone()) {
                    return Err(fail(
                        ERR_TABLE_UNIQUE,
                        format!("Duplicate value {} in unique column \"{}\"", key, column.name),
                    ));
                }
            }
            row.push(values);
        }
        rows.push(row);
    }

    debug!("table {}: {} columns, {} rows", name, columns.len(), rows.len());
    Ok(Table { name, columns, rows })
}

// ═══════════════════════════════════════════════════════════════════════════════
// CODE GENERATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Emitter {
    lines: Vec<String>,
}

impl Emitter {
    fn emit(&mut self, depth: usize, text: impl AsRef<str>) {
        self.lines.push(format!("{}{}", indent_for(depth), text.as_ref()));
    }
}

fn emit_group_key(out: &mut Emitter, ty: CellType) {
    match ty {
        CellType::Boolean => {
            out.emit(2, "local integer key = 0");
            out.emit(2, "if value then");
            out.emit(3, "set key = 1");
            out.emit(2, "endif");
        }
        CellType::Str => out.emit(2, "local integer key = StringHash(value)"),
        _ => out.emit(2, "local integer key = value"),
    }
}

/// Output-language library text for a validated table.
pub fn generate(table: &Table) -> Vec<String> {
    let offsets = table.offsets();
    let groups = table.index_groups();
    let mut out = Emitter::default();

    out.emit(0, format!("library {} initializer onInit requires {}", table.name, LIBS_AGGREGATE));
    out.emit(1, "globals");
    out.emit(2, "private hashtable HT = InitHashtable()");
    out.emit(2, format!("public constant integer COUNT = {}", table.rows.len()));
    for (column, (offset, width)) in table.columns.iter().zip(&offsets) {
        out.emit(2, format!("public constant integer {}_OFFSET = {}", column.constant(), offset));
        out.emit(2, format!("public constant integer {}_CAP = {}", column.constant(), width));
    }
    for group in groups.keys() {
        out.emit(2, format!("private hashtable IDX_{} = InitHashtable()", group.to_uppercase()));
    }
    out.emit(1, "endglobals");

    out.emit(1, "public function Count takes nothing returns integer");
    out.emit(2, "return COUNT");
    out.emit(1, "endfunction");

    for column in &table.columns {
        let ty = column.ty;
        let offset = format!("{}_OFFSET", column.constant());
        match column.list {
            None => {
                out.emit(
                    1,
                    format!("public function {} takes integer row returns {}", column.accessor(), ty.type_name()),
                );
                out.emit(2, format!("return Load{}(HT, row, {})", ty.storage(), offset));
                out.emit(1, "endfunction");
            }
            Some(_) => {
                out.emit(
                    1,
                    format!(
                        "public function {} takes integer row, integer index returns {}",
                        column.accessor(),
                        ty.type_name()
                    ),
                );
                out.emit(2, format!("if index < 0 or index >= {}_CAP then", column.constant()));
                out.emit(3, format!("return {}", ty.default_value()));
                out.emit(2, "endif");
                out.emit(2, format!("return Load{}(HT, row, {} + index)", ty.storage(), offset));
                out.emit(1, "endfunction");

                out.emit(
                    1,
                    format!("public function {}Size takes integer row returns integer", column.accessor()),
                );
                out.emit(2, format!("return LoadInteger(HT, row, -1 - {})", offset));
                out.emit(1, "endfunction");
            }
        }
    }

    for (group, (ty, _)) in &groups {
        let index = format!("IDX_{}", group.to_uppercase());
        let name = capitalize(group);

        out.emit(
            1,
            format!("public function {}Count takes {} value returns integer", name, ty.type_name()),
        );
        emit_group_key(&mut out, *ty);
        out.emit(2, format!("return LoadInteger({}, key, 0)", index));
        out.emit(1, "endfunction");

        out.emit(
            1,
            format!(
                "public function {}Find takes {} value, integer nth returns integer",
                name,
                ty.type_name()
            ),
        );
        emit_group_key(&mut out, *ty);
        out.emit(2, format!("if nth < 0 or nth >= LoadInteger({}, key, 0) then", index));
        out.emit(3, "return -1");
        out.emit(2, "endif");
        out.emit(2, format!("return LoadInteger({}, key, nth + 1)", index));
        out.emit(1, "endfunction");
    }

    out.emit(1, "private function onInit takes nothing returns nothing");
    for (row_id, row) in table.rows.iter().enumerate() {
        for ((column, cells), (offset, _)) in table.columns.iter().zip(row).zip(&offsets) {
            let store = column.ty.storage();
            for (i, value) in cells.iter().enumerate() {
                out.emit(
                    2,
                    format!("call Save{}(HT, {}, {}, {})", store, row_id, offset + i, value.literal()),
                );
            }
            if column.list.is_some() {
                out.emit(
                    2,
                    format!("call SaveInteger(HT, {}, {}, {})", row_id, -1 - *offset as i64, cells.len()),
                );
            }
        }
    }
    for (group, (_, keys)) in &groups {
        let index = format!("IDX_{}", group.to_uppercase());
        for (key, ids) in keys {
            out.emit(2, format!("call SaveInteger({}, {}, 0, {})", index, key, ids.len()));
            for (n, id) in ids.iter().enumerate() {
                out.emit(2, format!("call SaveInteger({}, {}, {}, {})", index, key, n + 1, id));
            }
        }
    }
    out.emit(1, "endfunction");
    out.emit(0, "endlibrary");
    out.lines
}

/// Compile a spreadsheet unit into line records.
pub fn compile(path: &Path, source: &str) -> Result<Vec<Line>> {
    let table = parse(path, source)?;
    let file: Rc<Path> = Rc::from(path);
    Ok(generate(&table)
        .into_iter()
        .map(|text| Line::new(text, SourcePos::new(file.clone(), None)))
        .collect())
}
