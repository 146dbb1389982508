/// Parser for Cobertura-style XML coverage reports.
///
/// Cobertura XML structure:
///   <coverage>
///     <sources><source>/repo/src</source></sources>
///     <packages>
///       <package name="src">
///         <classes>
///           <class name="Foo" filename="Foo.cs" line-rate="...">
///             <methods>
///               <method name="Bar" ...>
///                 <lines><line number="10" hits="0"/></lines>
///               </method>
///             </methods>
///           </class>
///         </classes>
///       </package>
///     </packages>
///   </coverage>
///
/// Only line hit counts are available, no columns. A package is attached
/// to every `<source>` whose last directory name equals the package name;
/// packages without such a source are skipped. `<sources>` must precede
/// `<packages>`, which is how every known writer emits them.
///
/// This schema is read leniently: a class, method or line with a missing
/// or unparseable attribute is skipped with a warning and the load goes
/// on. Only a broken document, a root other than `<coverage>`, or a
/// missing `<sources>` element fails the load.
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use super::{
    ensure_tag_closed, get_attr, looks_like_xml, sniff_head, xml_err, xml_reader, CoverageParser,
};
use crate::detect::Format;
use crate::error::{CovspanError, Result};
use crate::model::*;

pub struct CoberturaParser;

impl CoverageParser for CoberturaParser {
    fn format(&self) -> Format {
        Format::Cobertura
    }

    fn can_parse(&self, content: &[u8]) -> bool {
        let head = sniff_head(content);
        looks_like_xml(&head) && head.contains("<coverage") && !head.contains("<modules")
    }

    fn parse(&self, input: &[u8]) -> Result<Coverage> {
        parse(input).map(Coverage::LineHits)
    }
}

/// Parse a Cobertura-style document from raw bytes.
pub fn parse(input: &[u8]) -> Result<LineHitReport> {
    let mut xml = xml_reader(input);
    let mut buf = Vec::new();

    let mut report = LineHitReport::new();
    let mut saw_root = false;
    let mut saw_sources = false;
    let mut in_source = false;

    // Sources the current package was matched to; `None` while inside a
    // package that is being skipped (or outside any package).
    let mut package_sources: Option<Vec<String>> = None;
    // One entry per matched source for the class being read.
    let mut current_classes: Vec<ClassCoverage> = Vec::new();
    let mut current_method: Option<MethodCoverage> = None;
    // Open elements; anything left open at end of input is a truncated file.
    let mut depth = 0usize;

    loop {
        let event = xml.read_event_into(&mut buf);
        let is_start_event = matches!(&event, Ok(Event::Start(_)));
        match event {
            Err(e) => return Err(xml_err(e, &xml)),
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if !saw_root {
                    if e.name().as_ref() != b"coverage" {
                        return Err(CovspanError::MalformedDocument(format!(
                            "expected <coverage> root element, found <{}>",
                            String::from_utf8_lossy(e.name().as_ref())
                        )));
                    }
                    saw_root = true;
                }
                ensure_tag_closed(input, &xml)?;
                if is_start_event {
                    depth += 1;
                }
                match e.name().as_ref() {
                    b"sources" => saw_sources = true,
                    b"source" => {
                        // Self-closing <source/> has no text and no End event.
                        in_source = is_start_event;
                    }
                    b"package" => {
                        // A self-closing package has no classes and no End event.
                        package_sources = if is_start_event {
                            match_package(e, &report.sources)
                        } else {
                            None
                        };
                    }
                    b"class" => {
                        if let Some(sources) = package_sources.as_ref() {
                            current_classes = start_class(e, sources, &mut report);
                            if !is_start_event {
                                report.classes.append(&mut current_classes);
                            }
                        }
                    }
                    b"method" => {
                        if !current_classes.is_empty() {
                            current_method = start_method(e);
                            if !is_start_event {
                                finish_method(current_method.take(), &mut current_classes);
                            }
                        }
                    }
                    b"line" => {
                        if let Some(method) = current_method.as_mut() {
                            if let Some(line) = read_line(e) {
                                method.lines.push(line);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_source {
                    let text = e.unescape().map_err(|err| xml_err(err, &xml))?;
                    push_source(&mut report, &text);
                    in_source = false;
                }
            }
            Ok(Event::CData(ref e)) => {
                if in_source {
                    push_source(&mut report, &String::from_utf8_lossy(e));
                    in_source = false;
                }
            }
            Ok(Event::End(ref e)) => {
                depth = depth.saturating_sub(1);
                match e.name().as_ref() {
                    b"source" => in_source = false,
                    b"method" => finish_method(current_method.take(), &mut current_classes),
                    b"class" => report.classes.append(&mut current_classes),
                    b"package" => {
                        package_sources = None;
                        current_classes.clear();
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
    if depth > 0 {
        return Err(CovspanError::MalformedDocument(
            "document ended inside an unclosed element".to_string(),
        ));
    }
    if !saw_sources {
        return Err(CovspanError::MalformedDocument(
            "no <sources> element found".to_string(),
        ));
    }

    debug!(
        sources = report.sources.len(),
        classes = report.classes.len(),
        "parsed cobertura coverage report"
    );

    Ok(report)
}

fn push_source(report: &mut LineHitReport, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        warn!("skipping empty <source> element");
    } else {
        report.sources.push(text.to_string());
    }
}

/// The last directory name of a source path: `/repo/src/` -> `src`.
pub fn trailing_dir_name(source: &str) -> &str {
    let trimmed = source.trim_end_matches(['/', '\\']);
    trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed)
}

/// Full path of a class file under a source directory. The class
/// `filename` is appended to the source text verbatim.
pub fn resolve_file_path(source: &str, filename: &str) -> String {
    format!("{source}{filename}")
}

fn match_package(e: &BytesStart<'_>, sources: &[String]) -> Option<Vec<String>> {
    let Some(name) = get_attr(e, b"name") else {
        warn!("skipping <package> without a name attribute");
        return None;
    };
    let matched: Vec<String> = sources
        .iter()
        .filter(|s| trailing_dir_name(s) == name)
        .cloned()
        .collect();
    if matched.is_empty() {
        debug!(package = %name, "no <source> matches package, skipping");
        return None;
    }
    Some(matched)
}

/// Open a class under every matched source, registering its path in the
/// folder/file tree. Returns no classes when required attributes are missing.
fn start_class(
    e: &BytesStart<'_>,
    sources: &[String],
    report: &mut LineHitReport,
) -> Vec<ClassCoverage> {
    let (Some(class_name), Some(filename)) = (get_attr(e, b"name"), get_attr(e, b"filename"))
    else {
        warn!("skipping <class> without name/filename attributes");
        return Vec::new();
    };

    let segments: Vec<&str> = filename
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        warn!(class = %class_name, "skipping <class> with an empty filename");
        return Vec::new();
    }

    sources
        .iter()
        .map(|source| {
            let mut node = report.tree_root_mut(source);
            for (i, segment) in segments.iter().enumerate() {
                let kind = if i + 1 == segments.len() {
                    NodeKind::File
                } else {
                    NodeKind::Folder
                };
                node = node.child_mut(segment, kind);
            }
            ClassCoverage {
                file_path: resolve_file_path(source, &filename),
                class_name: class_name.clone(),
                methods: Vec::new(),
            }
        })
        .collect()
}

fn start_method(e: &BytesStart<'_>) -> Option<MethodCoverage> {
    match get_attr(e, b"name") {
        Some(name) => Some(MethodCoverage {
            name,
            lines: Vec::new(),
        }),
        None => {
            warn!("skipping <method> without a name attribute");
            None
        }
    }
}

fn finish_method(method: Option<MethodCoverage>, classes: &mut [ClassCoverage]) {
    if let Some(method) = method {
        for class in classes.iter_mut() {
            class.methods.push(method.clone());
        }
    }
}

fn read_line(e: &BytesStart<'_>) -> Option<LineCoverage> {
    let number = get_attr(e, b"number").and_then(|v| v.trim().parse::<u32>().ok());
    let hits = get_attr(e, b"hits").and_then(|v| v.trim().parse::<u64>().ok());
    match (number, hits) {
        (Some(line_number), Some(hit_count)) => Some(LineCoverage {
            line_number,
            hit_count,
        }),
        _ => {
            warn!("skipping <line> with missing or invalid number/hits");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &[u8] = br#"<?xml version="1.0" encoding="utf-8"?>
<coverage line-rate="0.5" version="1.9">
  <sources>
    <source>/repo/src</source>
  </sources>
  <packages>
    <package name="src" line-rate="0.5">
      <classes>
        <class name="Foo" filename="Foo.cs" line-rate="0.5">
          <methods>
            <method name="Bar" signature="()" line-rate="0.5">
              <lines>
                <line number="10" hits="0" branch="false"/>
                <line number="11" hits="3" branch="false"/>
              </lines>
            </method>
          </methods>
          <lines>
            <line number="10" hits="0" branch="false"/>
            <line number="11" hits="3" branch="false"/>
          </lines>
        </class>
      </classes>
    </package>
  </packages>
</coverage>"#;

    #[test]
    fn test_parse_cobertura() {
        let report = parse(SCENARIO).unwrap();

        assert_eq!(report.sources, vec!["/repo/src"]);
        assert_eq!(report.classes.len(), 1);

        let class = &report.classes[0];
        assert_eq!(class.file_path, "/repo/srcFoo.cs");
        assert_eq!(class.class_name, "Foo");
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].name, "Bar");
        assert_eq!(
            class.methods[0].lines,
            vec![
                LineCoverage {
                    line_number: 10,
                    hit_count: 0
                },
                LineCoverage {
                    line_number: 11,
                    hit_count: 3
                },
            ]
        );

        let records: Vec<_> = report.records().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].file_path, "/repo/srcFoo.cs");
        assert_eq!(records[0].method_name, "Bar");
        assert!(!records[0].is_hit());
        assert!(records[1].is_hit());
    }

    #[test]
    fn test_tree_from_filenames() {
        let input = br#"<coverage>
  <sources><source>/repo/src/</source></sources>
  <packages>
    <package name="src">
      <classes>
        <class name="A" filename="app/models/A.cs"/>
        <class name="B" filename="app\models\B.cs"/>
        <class name="C" filename="app/C.cs"/>
      </classes>
    </package>
  </packages>
</coverage>"#;
        let report = parse(input).unwrap();

        assert_eq!(report.classes.len(), 3);
        assert_eq!(report.classes[0].file_path, "/repo/src/app/models/A.cs");

        assert_eq!(report.tree.len(), 1);
        let root = &report.tree[0];
        assert_eq!(root.name, "/repo/src/");
        assert_eq!(root.children.len(), 1);
        let app = root.child("app").unwrap();
        assert_eq!(app.kind, NodeKind::Folder);
        let models = app.child("models").unwrap();
        assert_eq!(models.children.len(), 2);
        assert_eq!(models.child("B.cs").unwrap().kind, NodeKind::File);
        assert_eq!(app.child("C.cs").unwrap().kind, NodeKind::File);
    }

    #[test]
    fn test_unmatched_package_is_skipped() {
        let input = br#"<coverage>
  <sources><source>/repo/src</source></sources>
  <packages>
    <package name="tests">
      <classes>
        <class name="T" filename="T.cs">
          <methods><method name="M"><lines><line number="1" hits="1"/></lines></method></methods>
        </class>
      </classes>
    </package>
  </packages>
</coverage>"#;
        let report = parse(input).unwrap();
        assert!(report.classes.is_empty());
        assert!(report.tree.is_empty());
    }

    #[test]
    fn test_package_matched_by_several_sources() {
        let input = br#"<coverage>
  <sources><source>/a/src</source><source>C:\b\src\</source></sources>
  <packages>
    <package name="src">
      <classes><class name="X" filename="X.cs"/></classes>
    </package>
  </packages>
</coverage>"#;
        let report = parse(input).unwrap();
        let paths: Vec<_> = report.classes.iter().map(|c| c.file_path.as_str()).collect();
        assert_eq!(paths, vec!["/a/srcX.cs", r"C:\b\src\X.cs"]);
        assert_eq!(report.tree.len(), 2);
    }

    #[test]
    fn test_bad_nodes_are_skipped() {
        let input = br#"<coverage>
  <sources><source>/repo/src</source></sources>
  <packages>
    <package name="src">
      <classes>
        <class name="NoFile">
          <methods><method name="M"><lines><line number="1" hits="1"/></lines></method></methods>
        </class>
        <class name="Good" filename="Good.cs">
          <methods>
            <method>
              <lines><line number="2" hits="1"/></lines>
            </method>
            <method name="Kept">
              <lines>
                <line number="3"/>
                <line number="x" hits="1"/>
                <line number="4" hits="-1"/>
                <line number="5" hits="2"/>
              </lines>
            </method>
          </methods>
        </class>
      </classes>
    </package>
  </packages>
</coverage>"#;
        let report = parse(input).unwrap();
        assert_eq!(report.classes.len(), 1);
        let class = &report.classes[0];
        assert_eq!(class.class_name, "Good");
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].name, "Kept");
        assert_eq!(
            class.methods[0].lines,
            vec![LineCoverage {
                line_number: 5,
                hit_count: 2
            }]
        );
    }

    #[test]
    fn test_empty_source_is_skipped() {
        let input = br#"<coverage>
  <sources><source></source><source/><source>/repo/src</source></sources>
  <packages/>
</coverage>"#;
        let report = parse(input).unwrap();
        assert_eq!(report.sources, vec!["/repo/src"]);
    }

    #[test]
    fn test_cdata_source() {
        let input = br#"<coverage>
  <sources><source><![CDATA[ /repo/src ]]></source></sources>
  <packages>
    <package name="src">
      <classes><class name="Foo" filename="Foo.cs"/></classes>
    </package>
  </packages>
</coverage>"#;
        let report = parse(input).unwrap();
        assert_eq!(report.sources, vec!["/repo/src"]);
        assert_eq!(report.classes.len(), 1);
        assert_eq!(report.classes[0].file_path, "/repo/srcFoo.cs");
    }

    #[test]
    fn test_self_closing_package_does_not_capture_classes() {
        let input = br#"<coverage>
  <sources><source>/repo/src</source></sources>
  <packages>
    <package name="src"/>
    <class name="Stray" filename="Stray.cs"/>
  </packages>
</coverage>"#;
        let report = parse(input).unwrap();
        assert!(report.classes.is_empty());
        assert!(report.tree.is_empty());
    }

    #[test]
    fn test_document_cut_inside_tag() {
        let input = br#"<coverage><sources><source>/repo/src</source></sources><packages><package name="src"><classes><class name="Foo" filena"#;
        let err = parse(input).unwrap_err();
        assert!(err.is_malformed_document(), "unexpected error: {err}");
    }

    #[test]
    fn test_wrong_root_is_fatal() {
        let err = parse(br#"<results><modules/></results>"#).unwrap_err();
        assert!(matches!(err, CovspanError::MalformedDocument(_)));
    }

    #[test]
    fn test_missing_sources_is_fatal() {
        let err = parse(br#"<coverage><packages/></coverage>"#).unwrap_err();
        assert!(matches!(err, CovspanError::MalformedDocument(_)));
    }

    #[test]
    fn test_malformed_xml_is_fatal() {
        let err = parse(br#"<coverage><sources></coverage>"#).unwrap_err();
        assert!(err.is_malformed_document());
        assert!(err.to_string().contains("position"));
    }

    #[test]
    fn test_trailing_dir_name() {
        assert_eq!(trailing_dir_name("/repo/src"), "src");
        assert_eq!(trailing_dir_name("/repo/src/"), "src");
        assert_eq!(trailing_dir_name(r"C:\work\proj\"), "proj");
        assert_eq!(trailing_dir_name("src"), "src");
    }

    #[test]
    fn test_can_parse() {
        let parser = CoberturaParser;
        assert!(parser.can_parse(SCENARIO));
        assert!(!parser.can_parse(b"<results><modules>"));
    }
}
