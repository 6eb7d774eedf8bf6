//! Building tree nodes from markup, via the html5gum tokenizer.

use anyhow::Result;
use html5gum::{HtmlString, Token};
use kstring::KString;

use crate::dom::{Dom, NodeId, NodeKind};
use crate::print::is_void_element;

/// Can't go through `MyFrom`, because this can fail.
fn kstring(s: HtmlString) -> Result<KString> {
    Ok(KString::from_string(String::from_utf8(s.0)?))
}

/// Elements whose whitespace text content is significant.
const TEXT_PRESERVING: &[&str] = &["pre", "textarea"];

/// Parse `markup` into a new parentless `Fragment` node holding the
/// top-level nodes. Tokenizer errors are recovered from the way a
/// browser would (the tokenizer already does that); end tags without
/// an open element are dropped, open elements at the end are closed.
/// Attributes come out sorted by name (html5gum keeps them in a
/// `BTreeMap`), not in source order.
pub fn parse_fragment(dom: &mut Dom, markup: &str) -> Result<NodeId> {
    let fragment = dom.new_fragment();
    // Stack of open elements; the fragment is always at the bottom.
    let mut open: Vec<NodeId> = vec![fragment];
    let mut text = String::new();

    macro_rules! current {
        () => { *open.last().expect("fragment is never popped") }
    }
    macro_rules! flush_text {
        () => {
            if ! text.is_empty() {
                let t = dom.new_text(std::mem::take(&mut text));
                dom.append_child(current!(), t)?;
            }
        }
    }

    for token in html5gum::Tokenizer::new(markup).infallible() {
        match token {
            Token::String(s) => {
                text.push_str(std::str::from_utf8(&**s)?);
            }
            Token::StartTag(starttag) => {
                flush_text!();
                let name = kstring(starttag.name)?;
                let mut attrs = Vec::with_capacity(starttag.attributes.len());
                for (k, v) in starttag.attributes {
                    attrs.push((kstring(k)?, kstring(v)?));
                }
                let void = is_void_element(&name);
                let elt = dom.new_element(name, attrs);
                dom.append_child(current!(), elt)?;
                if ! (starttag.self_closing || void) {
                    open.push(elt);
                }
            }
            Token::EndTag(endtag) => {
                flush_text!();
                let name: &str = std::str::from_utf8(&**endtag.name)?;
                if let Some(pos) = open.iter().rposition(
                    |id| dom.tag_name(*id).map_or(false, |t| t.eq_ignore_ascii_case(name)))
                {
                    open.truncate(pos);
                }
            }
            Token::Comment(s) => {
                flush_text!();
                let c = dom.new_comment(kstring(s)?);
                dom.append_child(current!(), c)?;
            }
            Token::Doctype(_) => (),
            Token::Error(_) => (),
        }
    }
    flush_text!();
    Ok(fragment)
}

fn is_whitespace_only(s: &str) -> bool {
    s.chars().all(char::is_whitespace)
}

/// Free whitespace-only text nodes below `root`, except inside
/// `pre`/`textarea`.
pub fn strip_whitespace_text(dom: &mut Dom, root: NodeId) -> Result<()> {
    let mut doomed = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        match dom.kind(id) {
            Some(NodeKind::Text(t)) => {
                if is_whitespace_only(t) {
                    doomed.push(id);
                }
                continue
            }
            Some(NodeKind::Element(e)) => {
                if TEXT_PRESERVING.contains(&e.tag()) {
                    continue
                }
            }
            _ => ()
        }
        stack.extend(dom.children(id).iter());
    }
    for id in doomed {
        dom.free_subtree(id)?;
    }
    Ok(())
}

/// Free all elements with tag `tag` below `root` (at any depth).
/// Returns how many were removed.
pub fn remove_elements_by_tag(dom: &mut Dom, root: NodeId, tag: &str) -> Result<usize> {
    let doomed: Vec<NodeId> = dom.descendants(root).into_iter().filter(
        |id| dom.tag_name(*id).map_or(false, |t| t.eq_ignore_ascii_case(tag)))
        .collect();
    let mut n = 0;
    for id in doomed {
        // may already be gone as part of an enclosing match
        if dom.is_live(id) {
            dom.free_subtree(id)?;
            n += 1;
        }
    }
    Ok(n)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::print::to_html_string;

    fn roundtrip(s: &str) -> String {
        let mut dom = Dom::new();
        let f = parse_fragment(&mut dom, s).unwrap();
        to_html_string(&dom, f)
    }

    #[test]
    fn t_parse_basic() {
        assert_eq!(roundtrip("<div><p>hi</p><span class=a>x</span></div>"),
                   "<div><p>hi</p><span class=\"a\">x</span></div>");
        assert_eq!(roundtrip("a<b>c</b>d"), "a<b>c</b>d");
    }

    #[test]
    fn t_parse_lowercases_and_closes() {
        assert_eq!(roundtrip("<DIV><p>hi</p><REQUEST src=\"/x\"></DIV>"),
                   "<div><p>hi</p><request src=\"/x\"></request></div>");
        assert_eq!(roundtrip("<div><i>open"), "<div><i>open</i></div>");
        assert_eq!(roundtrip("</p>stray"), "stray");
    }

    #[test]
    fn t_attributes_sorted_by_name() {
        assert_eq!(roundtrip("<request src=\"/n\" after=\"click:b\" Mode=ONE></request>"),
                   "<request after=\"click:b\" mode=\"ONE\" src=\"/n\"></request>");
    }

    #[test]
    fn t_parse_void_and_self_closing() {
        assert_eq!(roundtrip("<p>a<br>b<img src=x></p>"),
                   "<p>a<br>b<img src=\"x\"></p>");
        assert_eq!(roundtrip("<div><request src=\"/a\"/><p>x</p></div>"),
                   "<div><request src=\"/a\"></request><p>x</p></div>");
    }

    #[test]
    fn t_parse_entities_and_comments() {
        assert_eq!(roundtrip("<p>a &amp; b</p><!-- c -->"),
                   "<p>a &amp; b</p><!-- c -->");
    }

    #[test]
    fn t_strip_whitespace_text() -> Result<()> {
        let mut dom = Dom::new();
        let f = parse_fragment(&mut dom, "<div>\n  <p> x </p>\n  <pre> </pre>\n</div>")?;
        strip_whitespace_text(&mut dom, f)?;
        assert_eq!(to_html_string(&dom, f), "<div><p> x </p><pre> </pre></div>");
        Ok(())
    }

    #[test]
    fn t_remove_scripts() -> Result<()> {
        let mut dom = Dom::new();
        let f = parse_fragment(
            &mut dom, "<script>alert(1)</script><p>ok<script>x()</script></p>")?;
        let before = dom.live_count();
        assert_eq!(remove_elements_by_tag(&mut dom, f, "script")?, 2);
        assert_eq!(to_html_string(&dom, f), "<p>ok</p>");
        assert_eq!(dom.live_count(), before - 4);
        Ok(())
    }
}
