//! Compile-time analysis: template markup to a canonical tree plus
//! its validated placeholders.

use ahtml::{Dom, NodeId, parse_fragment, strip_whitespace_text};

use crate::diagnostics::Diagnostics;
use crate::error::{TemplateError, TemplateErrorKind};
use crate::placeholder::{Placeholder, PositionalId, PLACEHOLDER_TAG};

#[derive(Debug)]
pub struct Analysis {
    pub dom: Dom,
    /// The one top-level element.
    pub root: NodeId,
    /// The root is itself the placeholder.
    pub single_request: bool,
    /// In document order.
    pub placeholders: Vec<Placeholder>,
}

fn is_placeholder(dom: &Dom, id: NodeId) -> bool {
    dom.tag_name(id) == Some(PLACEHOLDER_TAG)
}

/// The placeholder elements below `root` with their positional ids.
/// Every element visited in pre-order (root excluded) takes the next
/// id; the content of placeholders isn't visited. Used both on the
/// template and on each instance's clone of it, so the ids agree.
pub fn placeholder_elements(dom: &Dom, root: NodeId) -> Vec<(PositionalId, NodeId)> {
    fn walk(dom: &Dom, id: NodeId, next: &mut u32, out: &mut Vec<(PositionalId, NodeId)>) {
        for child in dom.element_children(id) {
            let position = PositionalId(*next);
            *next += 1;
            if is_placeholder(dom, child) {
                out.push((position, child));
            } else {
                walk(dom, child, next, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(dom, root, &mut 0, &mut out);
    out
}

fn check_not_nested(dom: &Dom, id: NodeId, position: PositionalId) -> Result<(), TemplateError> {
    if dom.descendants(id).into_iter().any(|d| is_placeholder(dom, d)) {
        Err(TemplateErrorKind::NestedPlaceholder { position })?
    }
    Ok(())
}

pub fn analyze(src: &str, diagnostics: &Diagnostics) -> Result<Analysis, TemplateError> {
    if src.is_empty() {
        Err(TemplateErrorKind::EmptyTemplate)?
    }
    let mut dom = Dom::new();
    let fragment = parse_fragment(&mut dom, src)?;
    let top = dom.element_children(fragment);
    if top.len() > 1 {
        Err(TemplateErrorKind::MultipleRootElements { count: top.len() })?
    }
    let root = *top.first().ok_or(TemplateErrorKind::ElementUndefined)?;
    // Text around the root element is dropped along with the fragment
    dom.detach(root)?;
    dom.free_subtree(fragment)?;
    strip_whitespace_text(&mut dom, root)?;

    let single_request = is_placeholder(&dom, root);
    let placeholders = if single_request {
        let position = PositionalId(0);
        check_not_nested(&dom, root, position)?;
        let e = dom.element(root).ok_or(TemplateErrorKind::ElementUndefined)?;
        vec![Placeholder::from_element(e, position, true, diagnostics)?]
    } else {
        let found = placeholder_elements(&dom, root);
        if found.is_empty() {
            Err(TemplateErrorKind::PlaceholderNotFound)?
        }
        let mut placeholders = Vec::with_capacity(found.len());
        for (position, id) in found {
            check_not_nested(&dom, id, position)?;
            let e = dom.element(id).ok_or(TemplateErrorKind::ElementError { position })?;
            placeholders.push(Placeholder::from_element(e, position, false, diagnostics)?);
        }
        placeholders
    };

    Ok(Analysis { dom, root, single_request, placeholders })
}


#[cfg(test)]
mod tests {
    use super::*;
    use ahtml::to_html_string;

    fn analyze_(src: &str) -> Result<Analysis, TemplateError> {
        analyze(src, &Diagnostics::silent())
    }

    fn kind(src: &str) -> TemplateErrorKind {
        analyze_(src).unwrap_err().into_kind()
    }

    #[test]
    fn t_positions_count_all_elements() -> Result<(), TemplateError> {
        let a = analyze_(
            "<div>\n  <p><b>x</b></p>\n  <request src=\"/a\"><i>loading</i></request>\n  \
             <section><request src=\"/b\"></request></section>\n</div>")?;
        assert!(! a.single_request);
        let positions: Vec<u32> = a.placeholders.iter().map(|p| p.position.0).collect();
        // p=0 b=1 request=2 (not descended) section=3 request=4
        assert_eq!(positions, vec![2, 4]);
        assert_eq!(to_html_string(&a.dom, a.root),
                   "<div><p><b>x</b></p><request src=\"/a\"><i>loading</i></request>\
                    <section><request src=\"/b\"></request></section></div>");
        Ok(())
    }

    #[test]
    fn t_single_request() -> Result<(), TemplateError> {
        let a = analyze_("  <REQUEST src=\"/only\"></REQUEST>\n")?;
        assert!(a.single_request);
        assert_eq!(a.placeholders.len(), 1);
        assert_eq!(a.placeholders[0].source.as_str(), "/only");
        Ok(())
    }

    #[test]
    fn t_pre_keeps_whitespace() -> Result<(), TemplateError> {
        let a = analyze_("<div> <pre> a\n </pre> <request src=\"/x\"></request></div>")?;
        assert_eq!(to_html_string(&a.dom, a.root),
                   "<div><pre> a\n </pre><request src=\"/x\"></request></div>");
        Ok(())
    }

    #[test]
    fn t_structure_errors() {
        use TemplateErrorKind::*;
        assert!(matches!(kind(""), EmptyTemplate));
        assert!(matches!(kind("just text"), ElementUndefined));
        assert!(matches!(kind("<p></p><p></p>"), MultipleRootElements { count: 2 }));
        assert!(matches!(kind("<div><p>no placeholder</p></div>"), PlaceholderNotFound));
        assert!(matches!(kind("<div><request src=\"/a\"><request src=\"/b\"></request></request></div>"),
                         NestedPlaceholder { position: PositionalId(0) }));
        assert!(matches!(kind("<div><request></request></div>"),
                         MissingSource { position: PositionalId(0) }));
    }
}
