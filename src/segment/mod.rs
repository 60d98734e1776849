//! Two-level segmentation of a guideline document.
//!
//! `## ` headings open navigational section containers. Inside a container
//! every line that opens with a `D.D.D` identifier starts a chunk, which runs
//! until the next identifier line, subsection heading, thematic break or the
//! end of the container. A container without identifiers is one chunk.

pub mod metadata;

#[cfg(test)]
mod tests;

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::model::{CharSpan, Chunk, SectionContainer};
use crate::patterns::GuidelinePatterns;
use crate::util::{sanitize_ref_for_id, sha256_hex};

pub use metadata::{SYMPTOM_TAG_VOCABULARY, classify_site, extract_local_metadata, symptom_tags};

const CONTAINER_MARKER: &str = "## ";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Segmentation {
    pub containers: Vec<SectionContainer>,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug)]
pub struct Segmenter {
    patterns: GuidelinePatterns,
}

#[derive(Debug)]
struct OpenContainer {
    title: String,
    heading_start: usize,
    body_start: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Identifier,
    Subsection,
    Break,
}

impl Segmenter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            patterns: GuidelinePatterns::new()?,
        })
    }

    pub fn patterns(&self) -> &GuidelinePatterns {
        &self.patterns
    }

    /// Pure function of the document text; empty input yields an empty
    /// segmentation.
    pub fn segment(&self, document: &str) -> Segmentation {
        let mut out = Segmentation::default();
        let mut open: Option<OpenContainer> = None;
        let mut offset = 0_usize;

        for line in document.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();

            let Some(title) = container_title(line) else {
                continue;
            };

            if let Some(container) = open.take() {
                self.close_container(document, container, line_start, &mut out);
            }
            open = Some(OpenContainer {
                title,
                heading_start: line_start,
                body_start: offset,
            });
        }

        if let Some(container) = open.take() {
            self.close_container(document, container, document.len(), &mut out);
        }

        debug!(
            containers = out.containers.len(),
            chunks = out.chunks.len(),
            "segmented document"
        );
        out
    }

    fn close_container(
        &self,
        document: &str,
        container: OpenContainer,
        end: usize,
        out: &mut Segmentation,
    ) {
        let container_id = build_container_id(&container.title, container.heading_start);
        let site = classify_site(&container.title);
        let body = &document[container.body_start..end];

        let boundaries = self.boundaries(body);
        let mut chunk_ids = Vec::<String>::new();
        let mut subsection: Option<String> = None;

        let mut push_chunk = |start: usize, stop: usize, subsection: Option<&String>| {
            let Some(span) = trimmed_span(body, start, stop) else {
                return;
            };
            let text = &body[span.start..span.end];
            let absolute = CharSpan::new(
                container.body_start + span.start,
                container.body_start + span.end,
            );

            let mut section_path = vec![container.title.clone()];
            if let Some(title) = subsection {
                section_path.push(title.clone());
            }

            let local_metadata = extract_local_metadata(&self.patterns, text);
            let chunk_id = build_chunk_id(
                &container.title,
                local_metadata.rule_id.as_deref(),
                absolute.start,
                text,
            );
            let chunk_site = site
                .or_else(|| subsection.and_then(|title| classify_site(title)))
                .map(str::to_string);

            chunk_ids.push(chunk_id.clone());
            out.chunks.push(Chunk {
                chunk_id,
                text: text.to_string(),
                section_path,
                parent_container_id: container_id.clone(),
                site: chunk_site,
                char_span: absolute,
                local_metadata,
            });
        };

        if !boundaries
            .iter()
            .any(|(_, kind, _)| *kind == Boundary::Identifier)
        {
            push_chunk(0, body.len(), None);
        } else {
            for (index, (start, kind, heading)) in boundaries.iter().enumerate() {
                match kind {
                    Boundary::Subsection => subsection = heading.clone(),
                    Boundary::Break => {}
                    Boundary::Identifier => {
                        let stop = boundaries
                            .get(index + 1)
                            .map(|(next, _, _)| *next)
                            .unwrap_or(body.len());
                        push_chunk(*start, stop, subsection.as_ref());
                    }
                }
            }
        }

        out.containers.push(SectionContainer {
            container_id,
            title: container.title,
            site: site.map(str::to_string),
            char_span: CharSpan::new(container.heading_start, end),
            chunk_ids,
        });
    }

    /// Sorted chunk boundaries within a container body (relative offsets).
    fn boundaries(&self, body: &str) -> Vec<(usize, Boundary, Option<String>)> {
        let mut out = self
            .patterns
            .line_start_rule_ids(body)
            .into_iter()
            .map(|(start, _)| (start, Boundary::Identifier, None))
            .collect::<Vec<_>>();

        let mut offset = 0_usize;
        for line in body.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();

            if out.iter().any(|(start, _, _)| *start == line_start) {
                continue;
            }

            let trimmed = line.trim();
            if let Some(heading) = subsection_title(trimmed) {
                out.push((line_start, Boundary::Subsection, Some(heading)));
            } else if is_thematic_break(trimmed) {
                out.push((line_start, Boundary::Break, None));
            }
        }

        out.sort_by_key(|(start, _, _)| *start);
        out
    }
}

fn container_title(line: &str) -> Option<String> {
    let title = line.strip_prefix(CONTAINER_MARKER)?.trim();
    if title.is_empty() {
        return None;
    }
    Some(title.to_string())
}

fn subsection_title(trimmed_line: &str) -> Option<String> {
    let hashes = trimmed_line.chars().take_while(|ch| *ch == '#').count();
    if hashes < 3 {
        return None;
    }
    let title = trimmed_line[hashes..].trim();
    (!title.is_empty()).then(|| title.to_string())
}

fn is_thematic_break(trimmed_line: &str) -> bool {
    trimmed_line.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|marker| trimmed_line.chars().all(|ch| ch == *marker))
}

fn trimmed_span(body: &str, start: usize, stop: usize) -> Option<CharSpan> {
    let slice = &body[start..stop];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading == slice.len() {
        return None;
    }
    Some(CharSpan::new(start + leading, stop - trailing))
}

fn build_container_id(title: &str, heading_start: usize) -> String {
    let digest = sha256_hex(format!("{title}\n{heading_start}").as_bytes());
    format!("section:{}:{}", sanitize_ref_for_id(title), &digest[..12])
}

fn build_chunk_id(container_title: &str, rule_id: Option<&str>, start: usize, text: &str) -> String {
    let digest = sha256_hex(format!("{container_title}\n{start}\n{text}").as_bytes());
    let reference = rule_id
        .map(sanitize_ref_for_id)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "prose".to_string());
    format!("chunk:{reference}:{}", &digest[..12])
}
