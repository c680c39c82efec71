// 📄 Filing Extractor - information table out of a noisy text filing
//
// A raw filing is an SGML-ish text blob with the holdings table embedded
// somewhere inside. Extraction is three steps:
//   1. lexical scan for the <informationTable> ... </informationTable> span
//   2. parse that span into a small namespace-aware tree
//   3. field lookup through an ordered list of namespace strategies

use crate::error::{ExtractError, SkipReason};
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

/// Current 13F information table namespace
pub const NS_DOCUMENT: &str = "http://www.sec.gov/edgar/document/thirteenf/informationtable";

/// Legacy namespace still found in older filings
pub const NS_LEGACY: &str = "http://www.sec.gov/edgar/thirteenf/informationtable";

/// Directory names shorter than this are never treated as regulatory IDs
const MIN_REGULATORY_ID_LEN: usize = 5;

// ============================================================================
// LEXICAL SCAN
// ============================================================================

fn information_table_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?is)<(?:[a-z_][\w.-]*:)?informationTable\b[^>]*>.*?</(?:[a-z_][\w.-]*:)?informationTable\s*>",
        )
        .expect("information table pattern is valid")
    })
}

/// Locate the first information table span in raw filing text.
///
/// Returns `None` when the filing carries no table; that is not an error.
pub fn extract_information_table(content: &str) -> Option<&str> {
    information_table_pattern()
        .find(content)
        .map(|m| m.as_str())
}

// ============================================================================
// LABELED TREE
// ============================================================================

/// One element of the parsed information table
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlNode {
    /// Resolved namespace URI (None = unqualified)
    pub namespace: Option<String>,
    pub name: String,
    /// Text before the first child element, trimmed
    pub text: Option<String>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn is(&self, namespace: Option<&str>, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == namespace
    }

    /// First direct child with the given namespace and local name
    pub fn child(&self, namespace: Option<&str>, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.is(namespace, name))
    }

    /// All matching descendants (self included), document order
    pub fn descendants<'a>(&'a self, namespace: Option<&str>, name: &str) -> Vec<&'a XmlNode> {
        let mut found = Vec::new();
        self.collect(namespace, name, &mut found);
        found
    }

    fn collect<'a>(&'a self, namespace: Option<&str>, name: &str, out: &mut Vec<&'a XmlNode>) {
        if self.is(namespace, name) {
            out.push(self);
        }
        for child in &self.children {
            child.collect(namespace, name, out);
        }
    }
}

fn utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn resolve_namespace(resolved: ResolveResult, name: &str) -> Result<Option<String>, ExtractError> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(utf8(ns.as_ref()))),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(_) => Err(ExtractError::UnboundPrefix(name.to_string())),
    }
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

fn push_text(stack: &mut [XmlNode], text: &str) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    if let Some(node) = stack.last_mut() {
        // Only leading text counts; text after a child element is tail text
        if node.children.is_empty() {
            match node.text.as_mut() {
                Some(existing) => existing.push_str(trimmed),
                None => node.text = Some(trimmed.to_string()),
            }
        }
    }
}

/// Parse an extracted table span into a tree.
///
/// Any XML error (mismatched tags, unbound prefixes, truncation) rejects the
/// whole document so the caller writes nothing for the file.
pub fn parse_tree(xml: &str) -> Result<XmlNode, ExtractError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let (resolved, event) = reader.read_resolved_event()?;
        match event {
            Event::Start(start) => {
                let name = utf8(start.local_name().as_ref());
                let namespace = resolve_namespace(resolved, &name)?;
                stack.push(XmlNode {
                    namespace,
                    name,
                    ..XmlNode::default()
                });
            }
            Event::Empty(start) => {
                let name = utf8(start.local_name().as_ref());
                let namespace = resolve_namespace(resolved, &name)?;
                let node = XmlNode {
                    namespace,
                    name,
                    ..XmlNode::default()
                };
                attach(&mut stack, &mut root, node);
            }
            Event::Text(text) => {
                let unescaped = text.unescape()?;
                push_text(&mut stack, &unescaped);
            }
            Event::CData(cdata) => {
                push_text(&mut stack, &utf8(&cdata.into_inner()));
            }
            Event::End(_) => {
                // End-name mismatches are rejected by the reader itself
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut root, node);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ExtractError::Unclosed(open.name.clone()));
    }

    root.ok_or(ExtractError::Empty)
}

/// Text → tree in one step; the file-level skip reason on failure
pub fn extract_tree(content: &str) -> Result<XmlNode, SkipReason> {
    let table = extract_information_table(content).ok_or(SkipReason::NoInformationTable)?;
    Ok(parse_tree(table)?)
}

// ============================================================================
// NAMESPACE PROBING
// ============================================================================

/// One way of addressing an element inside a table row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStrategy {
    Namespaced(&'static str),
    Bare,
}

impl LookupStrategy {
    fn namespace(&self) -> Option<&'static str> {
        match self {
            LookupStrategy::Namespaced(ns) => Some(ns),
            LookupStrategy::Bare => None,
        }
    }
}

/// Priority order for every row/field lookup
pub const LOOKUP_ORDER: [LookupStrategy; 3] = [
    LookupStrategy::Namespaced(NS_DOCUMENT),
    LookupStrategy::Namespaced(NS_LEGACY),
    LookupStrategy::Bare,
];

/// First child element matching `tag` under the first strategy that has one
pub fn find_child<'a>(node: &'a XmlNode, tag: &str) -> Option<&'a XmlNode> {
    LOOKUP_ORDER
        .iter()
        .find_map(|strategy| node.child(strategy.namespace(), tag))
}

/// Text of the first strategy that yields a non-empty value
pub fn field_text<'a>(node: &'a XmlNode, tag: &str) -> Option<&'a str> {
    LOOKUP_ORDER.iter().find_map(|strategy| {
        node.child(strategy.namespace(), tag)
            .and_then(|child| child.text.as_deref())
            .filter(|text| !text.is_empty())
    })
}

/// All `infoTable` rows, from the first strategy that finds any
pub fn info_table_rows(root: &XmlNode) -> Vec<&XmlNode> {
    LOOKUP_ORDER
        .iter()
        .map(|strategy| root.descendants(strategy.namespace(), "infoTable"))
        .find(|rows| !rows.is_empty())
        .unwrap_or_default()
}

// ============================================================================
// FILE DISCOVERY
// ============================================================================

/// A filing file plus the filer ID its path supplies (if any)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingFile {
    pub path: PathBuf,
    pub regulatory_id: Option<String>,
}

/// A numeric directory name longer than four digits
pub fn is_regulatory_id(name: &str) -> bool {
    name.len() >= MIN_REGULATORY_ID_LEN && name.chars().all(|c| c.is_ascii_digit())
}

/// First qualifying directory component of `path` below `root`
pub fn regulatory_id_from_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parent = relative.parent()?;
    parent
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .find(|name| is_regulatory_id(name))
        .map(str::to_string)
}

/// Recursively find every `.txt` filing below `root`, sorted by path
pub fn discover_filings(root: &Path) -> Vec<FilingFile> {
    let mut files: Vec<FilingFile> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
        })
        .map(|entry| FilingFile {
            regulatory_id: regulatory_id_from_path(root, entry.path()),
            path: entry.into_path(),
        })
        .collect();

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

// ============================================================================
// TESTS
// ============================================================================
