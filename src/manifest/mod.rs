pub mod image;
pub mod labels;
pub mod namespaces;
pub mod visitor;

use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::sync::LazyLock;

use regex::bytes::Regex;

/// Separator emitted between documents on re-serialisation.
const SEPARATOR: &[u8] = b"\n---\n";

/// A document boundary: an `apiVersion:` key at the start of a line, with an
/// optional `---` separator line in front of it. kubectl and most renderers
/// emit proper separators, but concatenated output from multiple invocations
/// frequently lacks them.
static BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|\n)(---\n)?apiVersion: ").expect("boundary regex must compile")
});

/// An ordered list of opaque YAML documents.
///
/// Documents are kept as raw bytes so that untouched manifests round-trip
/// bit-for-bit; parsing only happens inside the visitors that need it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestList {
    docs: Vec<Vec<u8>>,
}

impl ManifestList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `buf` into documents and append them in order.
    ///
    /// Splits on `---` separator lines and on bare `apiVersion:` keys at the
    /// start of a line, so concatenated output without separators still
    /// yields one entry per document. Empty documents are dropped.
    pub fn append(&mut self, buf: &[u8]) {
        let normalized = normalize_newlines(buf);
        let mut starts: Vec<usize> = Vec::new();
        for m in BOUNDARY_RE.find_iter(&normalized) {
            let s = m.start();
            starts.push(if normalized[s] == b'\n' { s + 1 } else { s });
        }

        if starts.is_empty() {
            self.push_doc(&normalized);
            return;
        }
        if starts[0] != 0 {
            self.push_doc(&normalized[..starts[0]]);
        }
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(normalized.len());
            self.push_doc(&normalized[start..end]);
        }
    }

    /// Append a single pre-split document (no boundary scanning).
    pub fn push(&mut self, doc: Vec<u8>) {
        self.push_doc(&doc);
    }

    fn push_doc(&mut self, doc: &[u8]) {
        let mut d = doc;
        while d.starts_with(b"---\n") {
            d = &d[4..];
        }
        let mut d = trim_bytes(d);
        // A trailing separator line belongs to the boundary, not the document.
        while d.ends_with(b"\n---") {
            d = trim_bytes(&d[..d.len() - 4]);
        }
        if d.is_empty() || d == b"---" {
            return;
        }
        self.docs.push(d.to_vec());
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.docs.iter().map(Vec::as_slice)
    }

    /// Documents of `self` whose bytes do not appear in `previous`.
    ///
    /// Order-insensitive set difference on exact byte equality; document
    /// order of `self` is preserved in the result.
    pub fn diff(&self, previous: &ManifestList) -> ManifestList {
        let prev: HashSet<&[u8]> = previous.docs.iter().map(Vec::as_slice).collect();
        ManifestList {
            docs: self
                .docs
                .iter()
                .filter(|d| !prev.contains(d.as_slice()))
                .cloned()
                .collect(),
        }
    }

    /// A streaming reader over the concatenated form, for piping to kubectl.
    pub fn reader(&self) -> ManifestReader<'_> {
        ManifestReader {
            list: self,
            doc: 0,
            offset: 0,
            in_separator: false,
        }
    }
}

impl fmt::Display for ManifestList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, doc) in self.docs.iter().enumerate() {
            if i > 0 {
                f.write_str("\n---\n")?;
            }
            f.write_str(&String::from_utf8_lossy(doc))?;
        }
        Ok(())
    }
}

impl Extend<Vec<u8>> for ManifestList {
    fn extend<T: IntoIterator<Item = Vec<u8>>>(&mut self, iter: T) {
        for doc in iter {
            self.push_doc(&doc);
        }
    }
}

impl FromIterator<Vec<u8>> for ManifestList {
    fn from_iter<T: IntoIterator<Item = Vec<u8>>>(iter: T) -> Self {
        let mut list = ManifestList::new();
        list.extend(iter);
        list
    }
}

/// Streams the documents of a [`ManifestList`] with `---` separators,
/// without materialising the concatenated buffer.
pub struct ManifestReader<'a> {
    list: &'a ManifestList,
    doc: usize,
    offset: usize,
    in_separator: bool,
}

impl Read for ManifestReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut written = 0;
        while written < buf.len() && self.doc < self.list.docs.len() {
            let chunk: &[u8] = if self.in_separator {
                &SEPARATOR[self.offset..]
            } else {
                &self.list.docs[self.doc][self.offset..]
            };
            if chunk.is_empty() {
                if self.in_separator {
                    self.in_separator = false;
                } else {
                    self.doc += 1;
                    self.in_separator = self.doc < self.list.docs.len();
                }
                self.offset = 0;
                continue;
            }
            let n = chunk.len().min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&chunk[..n]);
            written += n;
            self.offset += n;
        }
        Ok(written)
    }
}

fn normalize_newlines(buf: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len());
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\r' && buf.get(i + 1) == Some(&b'\n') {
            i += 1;
            continue;
        }
        out.push(buf[i]);
        i += 1;
    }
    out
}

fn trim_bytes(mut d: &[u8]) -> &[u8] {
    while let Some(&b) = d.first() {
        if b.is_ascii_whitespace() {
            d = &d[1..];
        } else {
            break;
        }
    }
    while let Some(&b) = d.last() {
        if b.is_ascii_whitespace() {
            d = &d[..d.len() - 1];
        } else {
            break;
        }
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    const POD: &str = "apiVersion: v1\nkind: Pod\nmetadata:\n  name: leeroy";
    const SVC: &str = "apiVersion: v1\nkind: Service\nmetadata:\n  name: jenkins";

    #[test]
    fn append_single_document() {
        let mut list = ManifestList::new();
        list.append(POD.as_bytes());
        assert_eq!(list.len(), 1);
        assert_eq!(list.to_string(), POD);
    }

    #[test]
    fn append_with_separator() {
        let mut list = ManifestList::new();
        list.append(format!("{POD}\n---\n{SVC}\n").as_bytes());
        assert_eq!(list.len(), 2);
        assert_eq!(list.to_string(), format!("{POD}\n---\n{SVC}"));
    }

    #[test]
    fn append_without_separator_splits_on_api_version() {
        let mut list = ManifestList::new();
        list.append(format!("{POD}\n{SVC}\n").as_bytes());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn append_many_concatenated_documents() {
        let mut list = ManifestList::new();
        let docs: Vec<String> = (0..5)
            .map(|i| format!("apiVersion: v1\nkind: Pod\nmetadata:\n  name: pod-{i}"))
            .collect();
        list.append(docs.join("\n").as_bytes());
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn empty_documents_dropped() {
        let mut list = ManifestList::new();
        list.append(b"---\n---\n");
        assert!(list.is_empty());
        list.append(format!("---\n{POD}\n---\n").as_bytes());
        assert_eq!(list.len(), 1);
        assert_eq!(list.to_string(), POD);
    }

    #[test]
    fn windows_line_endings_normalised() {
        let mut list = ManifestList::new();
        list.append(POD.replace('\n', "\r\n").as_bytes());
        assert_eq!(list.len(), 1);
        assert_eq!(list.to_string(), POD);
    }

    #[test]
    fn leading_separator_and_trailing_newline_trimmed() {
        let mut list = ManifestList::new();
        list.append(format!("---\n{POD}\n").as_bytes());
        assert_eq!(list.to_string(), POD);
    }

    #[test]
    fn preamble_before_first_boundary_kept() {
        let mut list = ManifestList::new();
        list.append(format!("kind: Unversioned\nname: x\n---\n{POD}\n").as_bytes());
        assert_eq!(list.len(), 2);
        assert_eq!(list.iter().next().unwrap(), b"kind: Unversioned\nname: x");
    }

    #[test]
    fn diff_returns_changed_documents_only() {
        let mut previous = ManifestList::new();
        previous.append(format!("{POD}\n---\n{SVC}\n").as_bytes());

        let changed = POD.replace("leeroy", "leeroy-v2");
        let mut current = ManifestList::new();
        current.append(format!("{changed}\n---\n{SVC}\n").as_bytes());

        let diff = current.diff(&previous);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.to_string(), changed);
    }

    #[test]
    fn diff_of_identical_lists_is_empty() {
        let mut previous = ManifestList::new();
        previous.append(format!("{POD}\n---\n{SVC}\n").as_bytes());
        let current = previous.clone();
        assert!(current.diff(&previous).is_empty());
    }

    #[test]
    fn diff_is_order_insensitive() {
        let mut previous = ManifestList::new();
        previous.append(format!("{SVC}\n---\n{POD}\n").as_bytes());
        let mut current = ManifestList::new();
        current.append(format!("{POD}\n---\n{SVC}\n").as_bytes());
        assert!(current.diff(&previous).is_empty());
    }

    #[test]
    fn reader_matches_display() {
        let mut list = ManifestList::new();
        list.append(format!("{POD}\n---\n{SVC}\n").as_bytes());

        let mut buf = String::new();
        list.reader().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, list.to_string());
    }

    #[test]
    fn reader_with_tiny_buffer() {
        let mut list = ManifestList::new();
        list.append(format!("{POD}\n---\n{SVC}\n").as_bytes());

        let mut reader = list.reader();
        let mut out = Vec::new();
        let mut chunk = [0u8; 3];
        loop {
            let n = reader.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(String::from_utf8(out).unwrap(), list.to_string());
    }
}
