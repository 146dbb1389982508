//! In-memory representation of a loaded coverage report. The module/range
//! format fills a [`CoverageReport`]; the cobertura-style format only carries
//! line hit counts and fills a [`LineHitReport`]. Both end up behind
//! [`Coverage`], which is what the index is built from.

use std::collections::BTreeMap;

use serde::Serialize;

/// Compute a coverage rate, returning 0.0 when the total is zero.
#[must_use]
pub fn rate(covered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64
    }
}

/// A column-bounded span of one source file, as reported by the coverage
/// tool. Lines and columns are 1-based; the end column is exclusive.
///
/// Coordinates are kept signed because malformed reports do contain zero
/// and negative columns, and those are dealt with at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Range {
    pub source_id: u32,
    pub start_line: i64,
    pub end_line: i64,
    pub start_column: i64,
    pub end_column: i64,
    pub covered: bool,
}

impl Range {
    #[must_use]
    pub fn is_multi_line(&self) -> bool {
        self.end_line > self.start_line
    }
}

/// Covered / not-covered block counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockCounts {
    pub covered: u64,
    pub not_covered: u64,
}

impl BlockCounts {
    #[must_use]
    pub fn new(covered: u64, not_covered: u64) -> Self {
        Self {
            covered,
            not_covered,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.covered.saturating_add(self.not_covered)
    }

    #[must_use]
    pub fn rate(&self) -> f64 {
        rate(self.covered, self.total())
    }
}

impl std::ops::AddAssign for BlockCounts {
    fn add_assign(&mut self, other: Self) {
        self.covered = self.covered.saturating_add(other.covered);
        self.not_covered = self.not_covered.saturating_add(other.not_covered);
    }
}

/// A function/method with its block and line counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Function {
    pub id: u64,
    pub name: String,
    pub namespace: String,
    pub type_name: String,
    /// Source file of the first range reported for this function. `None`
    /// when the function has no ranges at all.
    pub source_id: Option<u32>,
    pub block_coverage: f64,
    pub line_coverage: f64,
    pub blocks_covered: u64,
    pub blocks_not_covered: u64,
    pub lines_covered: u64,
    pub lines_partially_covered: u64,
    pub lines_not_covered: u64,
}

impl Function {
    #[must_use]
    pub fn blocks(&self) -> BlockCounts {
        BlockCounts::new(self.blocks_covered, self.blocks_not_covered)
    }
}

/// A binary/assembly as reported by the module/range format.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Module {
    pub id: String,
    pub name: String,
    pub path: String,
    pub block_coverage: f64,
    pub line_coverage: f64,
    pub blocks_covered: u64,
    pub blocks_not_covered: u64,
    pub lines_covered: u64,
    pub lines_partially_covered: u64,
    pub lines_not_covered: u64,
    /// Ids of the source files declared under this module.
    pub source_ids: Vec<u32>,
    /// Indices into [`CoverageReport::functions`].
    pub function_indices: Vec<usize>,
}

impl Module {
    #[must_use]
    pub fn blocks(&self) -> BlockCounts {
        BlockCounts::new(self.blocks_covered, self.blocks_not_covered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub id: u32,
    pub full_path: String,
}

/// The complete result of parsing a module/range coverage document.
#[derive(Debug, Clone, Default)]
pub struct CoverageReport {
    pub modules: Vec<Module>,
    pub source_files: BTreeMap<u32, SourceFile>,
    pub functions: Vec<Function>,
    pub ranges: Vec<Range>,
    /// Sum of covered and not-covered blocks over all modules.
    pub total_blocks: u64,
    /// Sum of covered blocks over all modules.
    pub blocks_covered: u64,
}

impl CoverageReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source file. The first registration of an id wins;
    /// returns `false` when the id was already known.
    pub fn add_source_file(&mut self, id: u32, full_path: String) -> bool {
        if self.source_files.contains_key(&id) {
            return false;
        }
        self.source_files.insert(id, SourceFile { id, full_path });
        true
    }

    #[must_use]
    pub fn source_file(&self, id: u32) -> Option<&SourceFile> {
        self.source_files.get(&id)
    }

    /// All registered source files ordered by path.
    #[must_use]
    pub fn source_files(&self) -> Vec<&SourceFile> {
        let mut files: Vec<&SourceFile> = self.source_files.values().collect();
        files.sort_by(|a, b| a.full_path.cmp(&b.full_path).then(a.id.cmp(&b.id)));
        files
    }

    #[must_use]
    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Block counters of the module with the given id.
    #[must_use]
    pub fn module_coverage(&self, id: &str) -> Option<BlockCounts> {
        self.module(id).map(Module::blocks)
    }

    pub fn module_functions<'a>(&'a self, module: &'a Module) -> impl Iterator<Item = &'a Function> {
        module
            .function_indices
            .iter()
            .filter_map(|&i| self.functions.get(i))
    }

    #[must_use]
    pub fn blocks(&self) -> BlockCounts {
        BlockCounts::new(
            self.blocks_covered,
            self.total_blocks.saturating_sub(self.blocks_covered),
        )
    }
}

/// A single line that was instrumentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineCoverage {
    pub line_number: u32,
    pub hit_count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MethodCoverage {
    pub name: String,
    pub lines: Vec<LineCoverage>,
}

/// One `<class>` of a cobertura-style report, resolved against a source
/// directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassCoverage {
    pub file_path: String,
    pub class_name: String,
    pub methods: Vec<MethodCoverage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    Folder,
    File,
}

/// Folder/file hierarchy derived from class file names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathNode {
    pub name: String,
    pub kind: NodeKind,
    pub children: Vec<PathNode>,
}

impl PathNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            children: Vec::new(),
        }
    }

    /// Return the child with the given name, creating it if needed. A file
    /// node is never demoted back to a folder.
    pub fn child_mut(&mut self, name: &str, kind: NodeKind) -> &mut PathNode {
        let idx = match self.children.iter().position(|c| c.name == name) {
            Some(idx) => {
                if kind == NodeKind::File {
                    self.children[idx].kind = NodeKind::File;
                }
                idx
            }
            None => {
                self.children.push(PathNode::new(name, kind));
                self.children.len() - 1
            }
        };
        &mut self.children[idx]
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Option<&PathNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// A flattened `(file, class, method, line, hits)` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord<'a> {
    pub file_path: &'a str,
    pub class_name: &'a str,
    pub method_name: &'a str,
    pub line_number: u32,
    pub hit_count: u64,
}

impl LineRecord<'_> {
    #[must_use]
    pub fn is_hit(&self) -> bool {
        self.hit_count > 0
    }
}

/// The result of parsing a cobertura-style document: per-line hit counts,
/// no column information.
#[derive(Debug, Clone, Default)]
pub struct LineHitReport {
    /// `<source>` directories in document order.
    pub sources: Vec<String>,
    pub classes: Vec<ClassCoverage>,
    /// One root per matched source directory.
    pub tree: Vec<PathNode>,
}

impl LineHitReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> impl Iterator<Item = LineRecord<'_>> {
        self.classes.iter().flat_map(|class| {
            class.methods.iter().flat_map(move |method| {
                method.lines.iter().map(move |line| LineRecord {
                    file_path: &class.file_path,
                    class_name: &class.class_name,
                    method_name: &method.name,
                    line_number: line.line_number,
                    hit_count: line.hit_count,
                })
            })
        })
    }

    /// Root node for a source directory, created on first use.
    pub fn tree_root_mut(&mut self, source: &str) -> &mut PathNode {
        let idx = match self.tree.iter().position(|n| n.name == source) {
            Some(idx) => idx,
            None => {
                self.tree.push(PathNode::new(source, NodeKind::Folder));
                self.tree.len() - 1
            }
        };
        &mut self.tree[idx]
    }
}

/// Instrumented / hit line counters for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineCounts {
    pub instrumented: u64,
    pub hit: u64,
}

impl LineCounts {
    #[must_use]
    pub fn rate(&self) -> f64 {
        rate(self.hit, self.instrumented)
    }
}

/// A fully parsed report of either supported shape.
#[derive(Debug, Clone)]
pub enum Coverage {
    Blocks(CoverageReport),
    LineHits(LineHitReport),
}

/// A run of text tagged with its coverage status. `covered == None` means
/// there is no coverage data for the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyledSegment {
    pub text: String,
    pub covered: Option<bool>,
}

impl StyledSegment {
    pub const LINE_BREAK: &'static str = "\n";

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            covered: None,
        }
    }

    pub fn styled(text: impl Into<String>, covered: bool) -> Self {
        Self {
            text: text.into(),
            covered: Some(covered),
        }
    }

    /// Explicit break between two physical lines rendered in one block.
    pub fn line_break() -> Self {
        Self::plain(Self::LINE_BREAK)
    }

    #[must_use]
    pub fn is_line_break(&self) -> bool {
        self.covered.is_none() && self.text == Self::LINE_BREAK
    }
}

/// Segments for one physical line, or for the run of physical lines that a
/// multi-line range pulled together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedBlock {
    pub first_line: u32,
    pub last_line: u32,
    pub segments: Vec<StyledSegment>,
}

impl AnnotatedBlock {
    /// The line the caller should annotate next.
    #[must_use]
    pub fn next_line(&self) -> u32 {
        self.last_line + 1
    }

    /// Concatenation of all segment texts.
    #[must_use]
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }
}
