/// Parser for module/function/range coverage reports.
///
/// Structure:
///   <results>
///     <modules>
///       <module id="..." name="app.dll" path="app.dll" block_coverage="..."
///               line_coverage="..." blocks_covered="6" blocks_not_covered="0"
///               lines_covered="7" lines_partially_covered="0" lines_not_covered="0">
///         <functions>
///           <function id="8272" name="..." namespace="..." type_name="Program"
///                     block_coverage="100.00" line_coverage="100.00"
///                     blocks_covered="6" blocks_not_covered="0" ...>
///             <ranges>
///               <range source_id="0" start_line="4" end_line="4"
///                      start_column="1" end_column="37" covered="yes" />
///             </ranges>
///           </function>
///         </functions>
///         <source_files>
///           <source_file id="0" path="C:\src\Program.cs" />
///         </source_files>
///       </module>
///     </modules>
///   </results>
///
/// Unlike the cobertura-style schema this one is read strictly: a missing
/// or unparseable required attribute aborts the whole load.
///
/// `<source_files>` may come after `<functions>` inside a module, so
/// source ids are resolved once the whole document has been read. Every
/// range must resolve to a declared source file.
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use super::{
    ensure_tag_closed, get_attr, looks_like_xml, optional_num, require_attr, require_num,
    sniff_head, xml_err, xml_reader, CoverageParser,
};
use crate::detect::Format;
use crate::error::{CovspanError, Result};
use crate::model::*;

pub struct ModulesParser;

impl CoverageParser for ModulesParser {
    fn format(&self) -> Format {
        Format::Modules
    }

    fn can_parse(&self, content: &[u8]) -> bool {
        let head = sniff_head(content);
        looks_like_xml(&head) && head.contains("<modules")
    }

    fn parse(&self, input: &[u8]) -> Result<Coverage> {
        parse(input).map(Coverage::Blocks)
    }
}

/// Parse a module/range coverage document from raw bytes.
pub fn parse(input: &[u8]) -> Result<CoverageReport> {
    let mut xml = xml_reader(input);
    let mut buf = Vec::new();

    let mut report = CoverageReport::new();
    let mut saw_root = false;
    let mut saw_modules = false;
    let mut current_module: Option<Module> = None;
    let mut current_function: Option<Function> = None;
    // Open elements; anything left open at end of input is a truncated file.
    let mut depth = 0usize;

    loop {
        let event = xml.read_event_into(&mut buf);
        let is_empty_event = matches!(&event, Ok(Event::Empty(_)));
        match event {
            Err(e) => return Err(xml_err(e, &xml)),
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                saw_root = true;
                ensure_tag_closed(input, &xml)?;
                if !is_empty_event {
                    depth += 1;
                }
                match e.name().as_ref() {
                    b"modules" => saw_modules = true,
                    b"module" => {
                        let module = read_module(e)?;
                        if is_empty_event {
                            finish_module(&mut report, module)?;
                        } else {
                            current_module = Some(module);
                        }
                    }
                    b"source_file" => {
                        let id: u32 = require_num(e, "source_file", "id")?;
                        let path = require_attr(e, "source_file", "path")?;
                        if !report.add_source_file(id, path) {
                            debug!(id, "duplicate source file id, keeping first path");
                        }
                        if let Some(module) = current_module.as_mut() {
                            if !module.source_ids.contains(&id) {
                                module.source_ids.push(id);
                            }
                        }
                    }
                    b"function" => {
                        let function = read_function(e)?;
                        if is_empty_event {
                            finish_function(&mut report, current_module.as_mut(), function);
                        } else {
                            current_function = Some(function);
                        }
                    }
                    b"range" => {
                        let range = read_range(e)?;
                        // A function belongs to the file its first range touches.
                        if let Some(function) = current_function.as_mut() {
                            if function.source_id.is_none() {
                                function.source_id = Some(range.source_id);
                            }
                        }
                        report.ranges.push(range);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                depth = depth.saturating_sub(1);
                match e.name().as_ref() {
                    b"function" => {
                        if let Some(function) = current_function.take() {
                            finish_function(&mut report, current_module.as_mut(), function);
                        }
                    }
                    b"module" => {
                        if let Some(module) = current_module.take() {
                            finish_module(&mut report, module)?;
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(CovspanError::MalformedDocument(
            "document has no root element".to_string(),
        ));
    }
    if !saw_modules {
        return Err(CovspanError::MalformedDocument(
            "no <modules> element found".to_string(),
        ));
    }
    if depth > 0 || current_function.is_some() || current_module.is_some() {
        return Err(CovspanError::MalformedDocument(
            "document ended inside an unclosed element".to_string(),
        ));
    }

    resolve_references(&report)?;

    debug!(
        modules = report.modules.len(),
        source_files = report.source_files.len(),
        functions = report.functions.len(),
        ranges = report.ranges.len(),
        "parsed module coverage report"
    );

    Ok(report)
}

fn read_module(e: &BytesStart<'_>) -> Result<Module> {
    const EL: &str = "module";
    Ok(Module {
        id: require_attr(e, EL, "id")?,
        name: require_attr(e, EL, "name")?,
        path: require_attr(e, EL, "path")?,
        block_coverage: optional_num(e, EL, "block_coverage")?,
        line_coverage: optional_num(e, EL, "line_coverage")?,
        blocks_covered: require_num(e, EL, "blocks_covered")?,
        blocks_not_covered: require_num(e, EL, "blocks_not_covered")?,
        lines_covered: optional_num(e, EL, "lines_covered")?,
        lines_partially_covered: optional_num(e, EL, "lines_partially_covered")?,
        lines_not_covered: optional_num(e, EL, "lines_not_covered")?,
        source_ids: Vec::new(),
        function_indices: Vec::new(),
    })
}

fn read_function(e: &BytesStart<'_>) -> Result<Function> {
    const EL: &str = "function";
    Ok(Function {
        id: require_num(e, EL, "id")?,
        name: require_attr(e, EL, "name")?,
        namespace: get_attr(e, b"namespace").unwrap_or_default(),
        type_name: get_attr(e, b"type_name").unwrap_or_default(),
        source_id: None,
        block_coverage: optional_num(e, EL, "block_coverage")?,
        line_coverage: optional_num(e, EL, "line_coverage")?,
        blocks_covered: require_num(e, EL, "blocks_covered")?,
        blocks_not_covered: require_num(e, EL, "blocks_not_covered")?,
        lines_covered: optional_num(e, EL, "lines_covered")?,
        lines_partially_covered: optional_num(e, EL, "lines_partially_covered")?,
        lines_not_covered: optional_num(e, EL, "lines_not_covered")?,
    })
}

fn read_range(e: &BytesStart<'_>) -> Result<Range> {
    const EL: &str = "range";
    Ok(Range {
        source_id: require_num(e, EL, "source_id")?,
        start_line: require_num(e, EL, "start_line")?,
        end_line: require_num(e, EL, "end_line")?,
        start_column: require_num(e, EL, "start_column")?,
        end_column: require_num(e, EL, "end_column")?,
        covered: get_attr(e, b"covered")
            .map(|v| v.eq_ignore_ascii_case("yes"))
            .unwrap_or(false),
    })
}

fn finish_function(report: &mut CoverageReport, module: Option<&mut Module>, function: Function) {
    if let Some(module) = module {
        module.function_indices.push(report.functions.len());
    }
    report.functions.push(function);
}

fn finish_module(report: &mut CoverageReport, module: Module) -> Result<()> {
    let totals = report
        .blocks_covered
        .checked_add(module.blocks_covered)
        .zip(
            module
                .blocks_covered
                .checked_add(module.blocks_not_covered)
                .and_then(|blocks| report.total_blocks.checked_add(blocks)),
        );
    let Some((covered, total)) = totals else {
        return Err(CovspanError::MalformedDocument(format!(
            "block counters of module '{}' overflow the report totals",
            module.id
        )));
    };
    report.blocks_covered = covered;
    report.total_blocks = total;
    report.modules.push(module);
    Ok(())
}

/// Every range must point at a declared source file.
fn resolve_references(report: &CoverageReport) -> Result<()> {
    match report
        .ranges
        .iter()
        .find(|r| report.source_file(r.source_id).is_none())
    {
        Some(range) => Err(CovspanError::UnresolvableReference {
            source_id: range.source_id,
            line: range.start_line,
        }),
        None => Ok(()),
    }
}
