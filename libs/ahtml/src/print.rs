//! Serializing (parts of) a tree back to HTML.

use std::{collections::HashSet, io::Write};

use anyhow::Result;
use lazy_static::lazy_static;

use crate::dom::{Dom, NodeId, NodeKind};

lazy_static! {
    static ref VOID_ELEMENTS: HashSet<&'static str> = [
        "area", "base", "br", "col", "embed", "hr", "img", "input",
        "link", "meta", "source", "track", "wbr",
    ].into_iter().collect();
}

/// Elements that never have content nor a closing tag.
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(tag)
}

fn html_escape(out: &mut impl Write, bytes: &[u8]) -> std::io::Result<()> {
    let mut start = 0;
    for (i, b) in bytes.iter().enumerate() {
        let esc: &[u8] = match b {
            b'&' => b"&amp;",
            b'<' => b"&lt;",
            b'>' => b"&gt;",
            b'"' => b"&quot;",
            b'\'' => b"&#39;",
            _ => continue
        };
        out.write_all(&bytes[start..i])?;
        out.write_all(esc)?;
        start = i + 1;
    }
    out.write_all(&bytes[start..])
}

/// Print `id` and everything below it. Freed ids print nothing.
pub fn print_html_fragment(dom: &Dom, id: NodeId, out: &mut impl Write) -> Result<()> {
    match dom.kind(id) {
        None => (),
        Some(NodeKind::Text(s)) => html_escape(out, s.as_bytes())?,
        Some(NodeKind::Comment(s)) => {
            out.write_all(b"<!--")?;
            out.write_all(s.as_bytes())?;
            out.write_all(b"-->")?;
        }
        Some(NodeKind::Fragment) => {
            for c in dom.children(id) {
                print_html_fragment(dom, *c, out)?;
            }
        }
        Some(NodeKind::Element(e)) => {
            out.write_all(b"<")?;
            out.write_all(e.tag().as_bytes())?;
            for (k, v) in e.attrs() {
                out.write_all(b" ")?;
                out.write_all(k.as_bytes())?;
                out.write_all(b"=\"")?;
                html_escape(out, v.as_bytes())?;
                out.write_all(b"\"")?;
            }
            out.write_all(b">")?;
            if ! is_void_element(e.tag()) {
                for c in dom.children(id) {
                    print_html_fragment(dom, *c, out)?;
                }
                out.write_all(b"</")?;
                out.write_all(e.tag().as_bytes())?;
                out.write_all(b">")?;
            }
        }
    }
    Ok(())
}

pub fn to_html_string(dom: &Dom, id: NodeId) -> String {
    let mut v = Vec::new();
    print_html_fragment(dom, id, &mut v).expect("no I/O errors can happen");
    // Only str data and ASCII literals were written.
    String::from_utf8(v).expect("serialized html is UTF-8")
}

/// Serialize several sibling nodes, e.g. a region of inserted nodes.
pub fn nodes_to_html_string(dom: &Dom, ids: &[NodeId]) -> String {
    ids.iter().map(|id| to_html_string(dom, *id)).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_escape() {
        let mut dom = Dom::new();
        let p = dom.new_element("p", [("title", "a\"b")]);
        let t = dom.new_text("<x> & 'y'");
        dom.append_child(p, t).unwrap();
        assert_eq!(to_html_string(&dom, p),
                   "<p title=\"a&quot;b\">&lt;x&gt; &amp; &#39;y&#39;</p>");
    }

    #[test]
    fn t_void_and_freed() {
        let mut dom = Dom::new();
        let br = dom.new_element("br", None::<(&str, &str)>);
        assert_eq!(to_html_string(&dom, br), "<br>");
        dom.free_subtree(br).unwrap();
        assert_eq!(to_html_string(&dom, br), "");
    }
}
