//! # Journal Merge Engine
//!
//! Merges rendered snippets into the persisted journal page without ever
//! duplicating an activity.
//!
//! ## Algorithm
//! 1. Classify the document with the HTML tokenizer: no container, one
//!    balanced container, or a malformed one
//! 2. Parse the document into a DOM and locate the container by `id`
//! 3. Recover ids already present from `data-activity-id` attributes and
//!    `/activities/<id>` links inside the container
//! 4. Insert unseen snippets before the first existing child, in candidate
//!    order (newest batch first, existing entries untouched behind it)
//! 5. Serialize the tree back to text
//!
//! When nothing is new the input text is returned as-is, which makes a
//! second merge of the same candidates a no-op.

use std::collections::HashSet;
use std::io;

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
    TokenizerResult,
};
use kuchikiki::traits::*;
use kuchikiki::NodeRef;
use log::{debug, info, warn};
use percent_encoding::percent_decode_str;

use crate::activity::ActivityId;
use crate::error::MergeError;
use crate::render::{html_element, RenderedSnippet};

/// Attribute carrying the activity id on each snippet root.
pub const ID_ATTRIBUTE: &str = "data-activity-id";

/// Path segment preceding the id in activity links.
const ACTIVITY_PATH: &str = "/activities/";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const OPTIONAL_END: &[&str] = &[
    "p", "li", "dt", "dd", "option", "optgroup", "tr", "td", "th", "thead", "tbody", "tfoot",
    "colgroup", "rb", "rt", "rtc", "rp",
];

const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "main", "nav", "ol", "p", "pre", "section", "table", "ul",
];

/// Structural state of the journal document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentState {
    /// No element carries the container id.
    NoSection,
    /// Exactly one container, balanced.
    SectionPresent,
    /// Container markers present but unusable.
    Malformed { reason: String },
}

/// Result of one merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Full document text after the merge
    pub document: String,
    /// State of the input document
    pub state: DocumentState,
    /// Ids inserted, in document order
    pub inserted: Vec<ActivityId>,
    /// Candidate ids dropped because they were already present
    pub skipped: Vec<ActivityId>,
    /// Candidate ids dropped because their snippet does not embed exactly
    /// its own id
    pub rejected: Vec<ActivityId>,
}

impl MergeOutcome {
    /// Whether the document text differs from the input.
    pub fn changed(&self) -> bool {
        !self.inserted.is_empty()
    }
}

/// Merges snippets into the container element with a fixed `id`.
#[derive(Debug, Clone)]
pub struct JournalMerger {
    container_id: String,
}

impl JournalMerger {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Classify the document by scanning its tag stream.
    pub fn classify(&self, document: &str) -> DocumentState {
        let scan = ContainerScan::new(&self.container_id);
        let mut tokenizer = Tokenizer::new(scan, TokenizerOpts::default());
        let mut queue = BufferQueue::new();
        queue.push_back(StrTendril::from_slice(document));
        loop {
            match tokenizer.feed(&mut queue) {
                TokenizerResult::Done => break,
                // The scan never hands back script nodes; resume if it did.
                TokenizerResult::Script(()) => continue,
            }
        }
        tokenizer.end();
        tokenizer.sink.finish()
    }

    /// Every activity id recoverable from the container.
    ///
    /// Empty when there is no container; an error when it is malformed.
    pub fn existing_ids(&self, document: &str) -> Result<HashSet<ActivityId>, MergeError> {
        match self.classify(document) {
            DocumentState::NoSection => Ok(HashSet::new()),
            DocumentState::Malformed { reason } => Err(self.malformed(reason)),
            DocumentState::SectionPresent => {
                let dom = kuchikiki::parse_html().one(document);
                let container = self.find_container(&dom)?;
                Ok(ids_in_subtree(&container).into_iter().collect())
            }
        }
    }

    /// Ids of the container's entries, one per child element, in document
    /// order. Repeats are reported as they appear.
    pub fn entry_ids(&self, document: &str) -> Result<Vec<ActivityId>, MergeError> {
        match self.classify(document) {
            DocumentState::NoSection => Ok(Vec::new()),
            DocumentState::Malformed { reason } => Err(self.malformed(reason)),
            DocumentState::SectionPresent => {
                let dom = kuchikiki::parse_html().one(document);
                let container = self.find_container(&dom)?;
                Ok(container
                    .children()
                    .filter(|child| child.as_element().is_some())
                    .filter_map(|child| ids_in_subtree(&child).into_iter().next())
                    .collect())
            }
        }
    }

    /// Merge `candidates` into `document`.
    ///
    /// Candidates already present, or repeated earlier in `candidates`, are
    /// skipped. A candidate whose card does not embed exactly its own id is
    /// logged and rejected. A malformed container fails the merge without
    /// producing any partial document.
    pub fn merge(
        &self,
        document: &str,
        candidates: &[RenderedSnippet],
    ) -> Result<MergeOutcome, MergeError> {
        let state = self.classify(document);
        if let DocumentState::Malformed { reason } = &state {
            return Err(self.malformed(reason.clone()));
        }

        let dom = kuchikiki::parse_html().one(document);
        let existing_container = match state {
            DocumentState::SectionPresent => Some(self.find_container(&dom)?),
            _ => None,
        };

        let mut seen: HashSet<ActivityId> = existing_container
            .as_ref()
            .map(|c| ids_in_subtree(c).into_iter().collect())
            .unwrap_or_default();
        debug!("Journal #{} already holds {} activities", self.container_id, seen.len());

        let mut fresh = Vec::new();
        let mut skipped = Vec::new();
        let mut rejected = Vec::new();
        for snippet in candidates {
            if seen.contains(&snippet.id) {
                skipped.push(snippet.id.clone());
                continue;
            }
            match snippet_node(snippet) {
                Ok(node) => {
                    seen.insert(snippet.id.clone());
                    fresh.push((snippet.id.clone(), node));
                }
                Err(e) => {
                    warn!("Skipping activity {}: {}", snippet.id, e);
                    rejected.push(snippet.id.clone());
                }
            }
        }

        if fresh.is_empty() {
            debug!("No new activities for #{}, document unchanged", self.container_id);
            return Ok(MergeOutcome {
                document: document.to_string(),
                state,
                inserted: Vec::new(),
                skipped,
                rejected,
            });
        }

        let container = match existing_container {
            Some(container) => container,
            None => self.create_container(&dom)?,
        };
        let anchor = container.first_child();
        let mut inserted = Vec::with_capacity(fresh.len());
        for (id, node) in fresh {
            insert(&container, anchor.as_ref(), node);
            insert(&container, anchor.as_ref(), NodeRef::new_text("\n"));
            inserted.push(id);
        }

        let mut out = Vec::with_capacity(document.len() + 1024);
        dom.serialize(&mut out)
            .map_err(|source| MergeError::Serialize { source })?;
        let merged = String::from_utf8(out).map_err(|e| MergeError::Serialize {
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;

        info!(
            "Merged {} new activities into #{} ({} already present)",
            inserted.len(),
            self.container_id,
            skipped.len()
        );

        Ok(MergeOutcome {
            document: merged,
            state,
            inserted,
            skipped,
            rejected,
        })
    }

    /// The one element whose `id` attribute equals the container id.
    fn find_container(&self, dom: &NodeRef) -> Result<NodeRef, MergeError> {
        let mut matches = dom.inclusive_descendants().elements().filter(|element| {
            element.attributes.borrow().get("id") == Some(self.container_id.as_str())
        });
        match (matches.next(), matches.next()) {
            (Some(element), None) => Ok(element.as_node().clone()),
            (None, _) => Err(self.malformed("container not found in parsed tree".to_string())),
            (Some(_), Some(_)) => Err(self.malformed(format!(
                "id {:?} appears on more than one element",
                self.container_id
            ))),
        }
    }

    /// Append an empty container as the last child of `<body>`.
    fn create_container(&self, dom: &NodeRef) -> Result<NodeRef, MergeError> {
        let body = dom
            .select_first("body")
            .map_err(|()| self.malformed("document has no body".to_string()))?;
        let section = html_element("section", &[("id", self.container_id.as_str())]);
        body.as_node().append(section.clone());
        body.as_node().append(NodeRef::new_text("\n"));
        info!("Created journal container #{}", self.container_id);
        Ok(section)
    }

    fn malformed(&self, reason: String) -> MergeError {
        MergeError::Malformed {
            container_id: self.container_id.clone(),
            reason,
        }
    }
}

fn insert(container: &NodeRef, anchor: Option<&NodeRef>, node: NodeRef) {
    match anchor {
        Some(anchor) => anchor.insert_before(node),
        None => container.append(node),
    }
}

/// Build a snippet's card, checking it carries exactly its own id.
fn snippet_node(snippet: &RenderedSnippet) -> Result<NodeRef, MergeError> {
    let node = snippet.to_node();
    let ids: HashSet<ActivityId> = ids_in_subtree(&node).into_iter().collect();
    if ids.len() != 1 || !ids.contains(&snippet.id) {
        return Err(MergeError::Snippet {
            id: snippet.id.to_string(),
            details: format!("expected embedded id {}, found {:?}", snippet.id, ids),
        });
    }
    Ok(node)
}

/// Ids embedded anywhere under `node`, in document order, possibly repeated.
fn ids_in_subtree(node: &NodeRef) -> Vec<ActivityId> {
    let mut ids = Vec::new();
    for element in node.inclusive_descendants().elements() {
        let attributes = element.attributes.borrow();
        if let Some(raw) = attributes.get(ID_ATTRIBUTE).map(str::trim) {
            if !raw.is_empty() {
                ids.push(ActivityId::from(raw));
            }
        }
        if let Some(id) = attributes.get("href").and_then(activity_id_from_href) {
            ids.push(id);
        }
    }
    ids
}

/// Recover the id from a `<site>/activities/<id>` link. The segment is
/// percent-decoded.
pub fn activity_id_from_href(href: &str) -> Option<ActivityId> {
    let start = href.rfind(ACTIVITY_PATH)? + ACTIVITY_PATH.len();
    let rest = &href[start..];
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let decoded = percent_decode_str(&rest[..end]).decode_utf8().ok()?;
    let id = decoded.trim();
    if id.is_empty() {
        None
    } else {
        Some(ActivityId::from(id))
    }
}

// ============================================================================
// Container scan
// ============================================================================

/// Token sink tracking the container's open/close balance.
///
/// The sink also drives the tokenizer's text modes: after a `<script>`,
/// `<style>`, `<title>` or similar start tag the content up to the matching
/// end tag is text, never tags.
struct ContainerScan {
    container_id: String,
    markers: usize,
    /// Open elements inside the container, container first
    stack: Vec<String>,
    /// Open `<svg>`/`<math>` elements; raw-text rules do not apply inside
    foreign_depth: usize,
    problem: Option<String>,
}

impl ContainerScan {
    fn new(container_id: &str) -> Self {
        Self {
            container_id: container_id.to_string(),
            markers: 0,
            stack: Vec::new(),
            foreign_depth: 0,
            problem: None,
        }
    }

    /// Tokenizer mode to switch to after `tag`.
    fn text_mode(&mut self, tag: &Tag) -> TokenSinkResult<()> {
        let name: &str = &tag.name;
        if matches!(name, "svg" | "math") && !tag.self_closing {
            match tag.kind {
                TagKind::StartTag => self.foreign_depth += 1,
                TagKind::EndTag => self.foreign_depth = self.foreign_depth.saturating_sub(1),
            }
        }
        if tag.kind != TagKind::StartTag || tag.self_closing || self.foreign_depth > 0 {
            return TokenSinkResult::Continue;
        }
        match raw_text_kind(name) {
            Some(TextMode::Raw(kind)) => TokenSinkResult::RawData(kind),
            Some(TextMode::Plaintext) => TokenSinkResult::Plaintext,
            None => TokenSinkResult::Continue,
        }
    }

    fn fail(&mut self, reason: String) {
        if self.problem.is_none() {
            self.problem = Some(reason);
        }
    }

    fn on_tag(&mut self, tag: Tag) {
        if self.problem.is_some() {
            return;
        }
        let name: &str = &tag.name;
        match tag.kind {
            TagKind::StartTag => {
                let is_marker = tag
                    .attrs
                    .iter()
                    .any(|attr| &*attr.name.local == "id" && &*attr.value == self.container_id);
                if is_marker {
                    self.markers += 1;
                    if self.markers > 1 {
                        self.fail(format!(
                            "id {:?} appears on more than one element",
                            self.container_id
                        ));
                    } else if tag.self_closing
                        || VOID_ELEMENTS.contains(&name)
                        || raw_text_kind(name).is_some()
                    {
                        self.fail(format!("<{}> cannot hold entries", name));
                    } else {
                        self.stack.push(name.to_string());
                    }
                    return;
                }
                if self.stack.is_empty() || tag.self_closing || VOID_ELEMENTS.contains(&name) {
                    return;
                }
                while self.stack.len() > 1 {
                    let top = self.stack.last().map(String::as_str).unwrap_or_default();
                    if closes_on_start(top, name) {
                        self.stack.pop();
                    } else {
                        break;
                    }
                }
                self.stack.push(name.to_string());
            }
            TagKind::EndTag => {
                if self.stack.is_empty() {
                    return;
                }
                loop {
                    let top = match self.stack.last() {
                        Some(top) => top.clone(),
                        None => break,
                    };
                    if top == name {
                        self.stack.pop();
                        break;
                    }
                    if self.stack.len() > 1 && OPTIONAL_END.contains(&top.as_str()) {
                        self.stack.pop();
                        continue;
                    }
                    self.fail(format!("unexpected </{}> while <{}> is open", name, top));
                    break;
                }
            }
        }
    }

    fn finish(&self) -> DocumentState {
        if let Some(reason) = &self.problem {
            return DocumentState::Malformed {
                reason: reason.clone(),
            };
        }
        if self.markers == 0 {
            return DocumentState::NoSection;
        }
        if let Some(container) = self.stack.first() {
            return DocumentState::Malformed {
                reason: format!("<{}> container is never closed", container),
            };
        }
        DocumentState::SectionPresent
    }
}

impl TokenSink for ContainerScan {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => {
                let mode = self.text_mode(&tag);
                self.on_tag(tag);
                mode
            }
            _ => TokenSinkResult::Continue,
        }
    }
}

enum TextMode {
    Raw(RawKind),
    Plaintext,
}

/// Elements whose content the tokenizer reads as text.
fn raw_text_kind(name: &str) -> Option<TextMode> {
    match name {
        "title" | "textarea" => Some(TextMode::Raw(RawKind::Rcdata)),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" | "noscript" => {
            Some(TextMode::Raw(RawKind::Rawtext))
        }
        "script" => Some(TextMode::Raw(RawKind::ScriptData)),
        "plaintext" => Some(TextMode::Plaintext),
        _ => None,
    }
}

/// Whether opening `next` implicitly closes the open `top` element.
fn closes_on_start(top: &str, next: &str) -> bool {
    match top {
        "p" => CLOSES_PARAGRAPH.contains(&next),
        "li" => next == "li",
        "dt" | "dd" => next == "dt" || next == "dd",
        "option" => next == "option" || next == "optgroup",
        "td" | "th" => matches!(next, "td" | "th" | "tr"),
        "tr" => next == "tr",
        _ => false,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityRecord;
    use crate::render::{DateStyle, SnippetRenderer};

    const ID: &str = "activity-journal";

    fn merger() -> JournalMerger {
        JournalMerger::new(ID)
    }

    fn snippet(id: &str) -> RenderedSnippet {
        let record = ActivityRecord {
            id: Some(ActivityId::from(id)),
            activity_type: Some("RollerSki".to_string()),
            start_time: Some("2025-03-04T15:00:00Z".to_string()),
            distance_meters: Some(8046.7),
            moving_time_seconds: Some(1800),
            name: Some(format!("Roll {}", id)),
            ..Default::default()
        };
        SnippetRenderer::new("https://www.strava.com", DateStyle::Long)
            .render(&record)
            .unwrap()
    }

    fn snippets(ids: &[&str]) -> Vec<RenderedSnippet> {
        ids.iter().map(|id| snippet(id)).collect()
    }

    fn page(inner: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html><head><title>Journal</title></head>\n<body>\n<nav><a href=\"/\">Home</a></nav>\n<section id=\"{}\">\n{}\n</section>\n<footer>bye</footer>\n</body></html>\n",
            ID, inner
        )
    }

    fn ids(list: &[&str]) -> Vec<ActivityId> {
        list.iter().map(|id| ActivityId::from(*id)).collect()
    }

    // --- classification ---

    #[test]
    fn test_classify_states() {
        let m = merger();
        assert_eq!(m.classify(""), DocumentState::NoSection);
        assert_eq!(m.classify("<html><body><p>hi</p></body></html>"), DocumentState::NoSection);
        assert_eq!(m.classify(&page("")), DocumentState::SectionPresent);
        assert_eq!(
            m.classify(&page(&snippet("1").markup())),
            DocumentState::SectionPresent
        );
    }

    #[test]
    fn test_classify_ignores_marker_in_comment() {
        let doc = "<body><!-- <section id=\"activity-journal\"> --></body>";
        assert_eq!(merger().classify(doc), DocumentState::NoSection);
    }

    #[test]
    fn test_classify_tolerates_optional_end_tags() {
        let doc = page("<ul><li>one<li>two</ul><p>loose paragraph<div>block</div>");
        assert_eq!(merger().classify(&doc), DocumentState::SectionPresent);
    }

    #[test]
    fn test_classify_malformed() {
        let m = merger();
        let cases = [
            "<body><section id=\"activity-journal\"><article>open".to_string(),
            "<body><div id=\"activity-journal\"><article></div></article></body>".to_string(),
            "<body><div id=\"activity-journal\"></span></div></body>".to_string(),
            "<body><div id=\"activity-journal\"></div><div id=\"activity-journal\"></div></body>"
                .to_string(),
            "<body><img id=\"activity-journal\"></body>".to_string(),
            "<body><div id=\"activity-journal\"/></body>".to_string(),
        ];
        for doc in &cases {
            assert!(
                matches!(m.classify(doc), DocumentState::Malformed { .. }),
                "expected malformed: {}",
                doc
            );
        }
    }

    // --- id recovery ---

    #[test]
    fn test_activity_id_from_href() {
        assert_eq!(
            activity_id_from_href("https://www.strava.com/activities/12345"),
            Some(ActivityId::from("12345"))
        );
        assert_eq!(
            activity_id_from_href("https://www.strava.com/activities/12345/overview?x=1"),
            Some(ActivityId::from("12345"))
        );
        assert_eq!(
            activity_id_from_href("/activities/77#map"),
            Some(ActivityId::from("77"))
        );
        assert_eq!(
            activity_id_from_href("https://www.strava.com/activities/a%2Fb%3Fc?x=1"),
            Some(ActivityId::from("a/b?c"))
        );
        assert_eq!(activity_id_from_href("https://www.strava.com/activities/"), None);
        assert_eq!(activity_id_from_href("https://example.com/athletes/1"), None);
    }

    #[test]
    fn test_existing_ids_from_links_only() {
        // Older entries carry only the deep link.
        let doc = page(
            "<div class=\"workout-card\"><h2>Old</h2><a href=\"https://www.strava.com/activities/111\">View</a></div>",
        );
        let found = merger().existing_ids(&doc).unwrap();
        assert_eq!(found, ids(&["111"]).into_iter().collect());
    }

    #[test]
    fn test_ids_outside_container_are_ignored() {
        let doc = "<body><a href=\"https://www.strava.com/activities/5\">pinned</a><section id=\"activity-journal\"></section></body>";
        assert!(merger().existing_ids(doc).unwrap().is_empty());
    }

    // --- merge scenarios ---

    #[test]
    fn test_empty_document_gets_new_container() {
        let m = merger();
        let outcome = m.merge("", &snippets(&["999"])).unwrap();

        assert_eq!(outcome.state, DocumentState::NoSection);
        assert_eq!(outcome.inserted, ids(&["999"]));
        assert_eq!(m.classify(&outcome.document), DocumentState::SectionPresent);
        assert_eq!(m.entry_ids(&outcome.document).unwrap(), ids(&["999"]));
    }

    #[test]
    fn test_container_appended_at_end_of_body() {
        let doc = "<!DOCTYPE html><html><head></head><body><h1>Journal</h1><footer>f</footer></body></html>";
        let outcome = merger().merge(doc, &snippets(&["1"])).unwrap();

        let footer = outcome.document.find("<footer>").unwrap();
        let section = outcome.document.find("<section id=\"activity-journal\">").unwrap();
        assert!(section > footer);
        assert!(outcome.document.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn test_existing_entry_not_duplicated() {
        let m = merger();
        let doc = page(&snippet("111").markup());
        let outcome = m.merge(&doc, &snippets(&["111", "222"])).unwrap();

        assert_eq!(outcome.inserted, ids(&["222"]));
        assert_eq!(outcome.skipped, ids(&["111"]));
        assert_eq!(m.entry_ids(&outcome.document).unwrap(), ids(&["222", "111"]));
        assert_eq!(outcome.document.matches("data-activity-id=\"222\"").count(), 1);
        assert_eq!(outcome.document.matches("data-activity-id=\"111\"").count(), 1);
    }

    #[test]
    fn test_new_entries_prepended_in_candidate_order() {
        let m = merger();
        let existing = format!("{}\n{}", snippet("a").markup(), snippet("b").markup());
        let doc = page(&existing);
        let outcome = m.merge(&doc, &snippets(&["c", "d", "a"])).unwrap();

        assert_eq!(m.entry_ids(&outcome.document).unwrap(), ids(&["c", "d", "a", "b"]));
        // Surrounding boilerplate survives.
        assert!(outcome.document.contains("<nav><a href=\"/\">Home</a></nav>"));
        assert!(outcome.document.contains("<footer>bye</footer>"));
    }

    #[test]
    fn test_duplicate_candidates_inserted_once() {
        let m = merger();
        let outcome = m.merge(&page(""), &snippets(&["5", "6", "5"])).unwrap();

        assert_eq!(outcome.inserted, ids(&["5", "6"]));
        assert_eq!(outcome.skipped, ids(&["5"]));
        assert_eq!(m.entry_ids(&outcome.document).unwrap(), ids(&["5", "6"]));
    }

    #[test]
    fn test_no_new_entries_leaves_text_verbatim() {
        let doc = page(&snippet("111").markup()).replace("<footer>", "<footer   >");
        let outcome = merger().merge(&doc, &snippets(&["111"])).unwrap();

        assert!(!outcome.changed());
        assert_eq!(outcome.document, doc);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let m = merger();
        let docs = vec![
            String::new(),
            page(""),
            page(&snippet("1").markup()),
            "<html><body><p>no container</p></body></html>".to_string(),
        ];
        let sets: Vec<Vec<RenderedSnippet>> = vec![
            snippets(&[]),
            snippets(&["1"]),
            snippets(&["2", "1", "3"]),
        ];

        for doc in &docs {
            for set in &sets {
                let once = m.merge(doc, set).unwrap().document;
                let twice = m.merge(&once, set).unwrap();
                assert!(!twice.changed());
                assert_eq!(twice.document, once);
            }
        }
    }

    #[test]
    fn test_ids_after_merge_are_union_without_repeats() {
        let m = merger();
        let doc = page(&format!("{}{}", snippet("10").markup(), snippet("20").markup()));
        let set = snippets(&["20", "30", "40"]);
        let merged = m.merge(&doc, &set).unwrap().document;

        let entries = m.entry_ids(&merged).unwrap();
        let unique: HashSet<_> = entries.iter().cloned().collect();
        assert_eq!(entries.len(), unique.len());
        assert_eq!(unique, ids(&["10", "20", "30", "40"]).into_iter().collect());
        assert_eq!(m.existing_ids(&merged).unwrap(), unique);
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        let doc = "<body><section id=\"activity-journal\"><article>never closed";
        let err = merger().merge(doc, &snippets(&["1"])).unwrap_err();
        assert!(matches!(err, MergeError::Malformed { .. }));
        assert!(merger().existing_ids(doc).is_err());
    }

    #[test]
    fn test_inconsistent_snippets_are_skipped() {
        let m = merger();
        let mut foreign_link = snippet("1");
        foreign_link.entry.url = "https://www.strava.com/activities/2".to_string();
        let mut wrong_id = snippet("3");
        wrong_id.id = ActivityId::from("4");

        let set = vec![foreign_link, snippet("5"), wrong_id];
        let outcome = m.merge(&page(""), &set).unwrap();

        assert_eq!(outcome.inserted, ids(&["5"]));
        assert_eq!(outcome.rejected, ids(&["1", "4"]));
        assert_eq!(m.entry_ids(&outcome.document).unwrap(), ids(&["5"]));
    }

    #[test]
    fn test_only_rejected_snippets_leave_document_unchanged() {
        let mut bad = snippet("1");
        bad.entry.url = "https://www.strava.com/activities/2".to_string();
        let doc = page("");
        let outcome = merger().merge(&doc, &[bad]).unwrap();

        assert!(!outcome.changed());
        assert_eq!(outcome.rejected, ids(&["1"]));
        assert_eq!(outcome.document, doc);
    }

    #[test]
    fn test_escaped_content_survives_merge() {
        let mut card = snippet("7");
        card.entry.name = "A & B".to_string();
        let merged = merger().merge(&page(""), &[card]).unwrap().document;
        assert!(merged.contains("<h2>A &amp; B</h2>"));
    }

    #[test]
    fn test_ids_with_reserved_characters_round_trip() {
        let m = merger();
        let merged = m.merge("", &snippets(&["a/b?c"])).unwrap().document;

        assert!(merged.contains("/activities/a%2Fb%3Fc\""));
        assert_eq!(m.entry_ids(&merged).unwrap(), ids(&["a/b?c"]));
        let again = m.merge(&merged, &snippets(&["a/b?c"])).unwrap();
        assert!(!again.changed());
        assert_eq!(again.skipped, ids(&["a/b?c"]));
    }

    #[test]
    fn test_numeric_container_id() {
        let m = JournalMerger::new("2025");
        let first = m.merge("", &snippets(&["1"])).unwrap().document;
        assert_eq!(m.classify(&first), DocumentState::SectionPresent);

        let second = m.merge(&first, &snippets(&["2"])).unwrap();
        assert_eq!(second.inserted, ids(&["2"]));
        assert_eq!(m.entry_ids(&second.document).unwrap(), ids(&["2", "1"]));
        assert_eq!(m.existing_ids(&second.document).unwrap().len(), 2);
    }

    // --- raw text ---

    #[test]
    fn test_script_text_inside_container_is_not_markup() {
        let m = merger();
        let doc = "<body><section id=\"activity-journal\"><script>var s = \"</div>\";</script></section></body>";
        assert_eq!(m.classify(doc), DocumentState::SectionPresent);

        let outcome = m.merge(doc, &snippets(&["9"])).unwrap();
        assert_eq!(outcome.inserted, ids(&["9"]));
        assert!(outcome.document.contains("var s = \"</div>\";"));
    }

    #[test]
    fn test_marker_text_inside_head_script_is_ignored() {
        let doc = page("").replace(
            "<title>Journal</title>",
            "<title>Journal</title><script>document.write('<div id=\"activity-journal\">');</script>",
        );
        let m = merger();
        assert_eq!(m.classify(&doc), DocumentState::SectionPresent);
        assert_eq!(m.merge(&doc, &snippets(&["1"])).unwrap().inserted, ids(&["1"]));
    }

    #[test]
    fn test_other_text_elements_hide_tags() {
        let m = merger();
        let cases = [
            page("<style>p::after { content: \"</section>\"; }</style>"),
            page("<textarea></section><div></textarea>"),
            page("").replace(
                "<title>Journal</title>",
                "<title><section id=\"activity-journal\"></title>",
            ),
        ];
        for doc in &cases {
            assert_eq!(m.classify(doc), DocumentState::SectionPresent, "{}", doc);
        }
    }

    #[test]
    fn test_raw_text_container_is_malformed() {
        let doc = "<body><textarea id=\"activity-journal\"></textarea></body>";
        assert!(matches!(
            merger().classify(doc),
            DocumentState::Malformed { .. }
        ));
    }
}
