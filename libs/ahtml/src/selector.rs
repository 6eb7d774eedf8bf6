//! A small subset of CSS selectors: compound selectors made of a tag
//! name or `*`, `#id`, `.class`, `[attr]`, `[attr=value]` and the
//! pseudo-classes `:first-child`, `:last-child`, `:nth-child(an+b)`
//! and `:not(..)`, joined by descendant (whitespace), child (`>`),
//! adjacent sibling (`+`) and general sibling (`~`) combinators, with
//! comma separated alternatives.

use std::fmt::{self, Display};

use anyhow::{anyhow, bail, Result};
use itertools::Itertools;
use kstring::KString;

use crate::dom::{Dom, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrSel {
    Exists(KString),
    Equals(KString, KString),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pseudo {
    FirstChild,
    LastChild,
    /// 1-based positions `a*n + b` for some n >= 0.
    NthChild { a: i32, b: i32 },
    Not(Vec<Compound>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<KString>,
    id: Option<KString>,
    classes: Vec<KString>,
    attrs: Vec<AttrSel>,
    pseudos: Vec<Pseudo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    Adjacent,
    Sibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    // compounds[i + 1] is related to compounds[i] via combinators[i]
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    groups: Vec<Complex>,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || ! c.is_ascii()
}

/// The argument of `:nth-child`: `odd`, `even`, `b`, `an`, `an+b`,
/// `-n+b` etc.
fn parse_nth(arg: &str) -> Result<(i32, i32)> {
    let s: String = arg.chars().filter(|c| ! c.is_whitespace()).collect::<String>()
        .to_ascii_lowercase();
    let bad = || anyhow!("invalid :nth-child argument {arg:?}");
    match s.as_str() {
        "odd" => return Ok((2, 1)),
        "even" => return Ok((2, 0)),
        _ => ()
    }
    match s.find('n') {
        None => Ok((0, s.parse().map_err(|_| bad())?)),
        Some(i) => {
            let a: i32 = match &s[..i] {
                "" | "+" => 1,
                "-" => -1,
                a => a.parse().map_err(|_| bad())?
            };
            let b: i32 = match &s[i + 1..] {
                "" => 0,
                b if b.starts_with('+') || b.starts_with('-') =>
                    b.parse().map_err(|_| bad())?,
                _ => return Err(bad())
            };
            Ok((a, b))
        }
    }
}

fn nth_matches(a: i32, b: i32, position: i32) -> bool {
    if a == 0 {
        position == b
    } else {
        let d = position - b;
        d % a == 0 && d / a >= 0
    }
}

struct Parser<'s> {
    src: &'s str,
    chars: Vec<char>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().map_or(false, char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.peek() != Some(c) {
            bail!("expected {c:?} at position {} in selector {:?}", self.pos, self.src)
        }
        self.pos += 1;
        Ok(())
    }

    fn ident(&mut self) -> Result<KString> {
        let start = self.pos;
        while self.peek().map_or(false, is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            bail!("expected a name at position {} in selector {:?}", start, self.src)
        }
        Ok(KString::from_string(self.chars[start..self.pos].iter().collect()))
    }

    fn value(&mut self) -> Result<KString> {
        match self.peek() {
            Some(q) if q == '"' || q == '\'' => {
                self.pos += 1;
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c == q {
                        let v: String = self.chars[start..self.pos].iter().collect();
                        self.pos += 1;
                        return Ok(KString::from_string(v))
                    }
                    self.pos += 1;
                }
                bail!("unterminated string in selector {:?}", self.src)
            }
            _ => self.ident()
        }
    }

    /// Everything up to the closing parenthesis, which is consumed.
    fn parenthesized(&mut self) -> Result<String> {
        self.expect('(')?;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ')' {
                let v = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                return Ok(v)
            }
            self.pos += 1;
        }
        bail!("missing ')' in selector {:?}", self.src)
    }

    fn pseudo(&mut self) -> Result<Pseudo> {
        let name = self.ident()?.to_ascii_lowercase();
        Ok(match name.as_str() {
            "first-child" => Pseudo::FirstChild,
            "last-child" => Pseudo::LastChild,
            "nth-child" => {
                let (a, b) = parse_nth(&self.parenthesized()?)?;
                Pseudo::NthChild { a, b }
            }
            "not" => {
                self.expect('(')?;
                self.skip_ws();
                let mut alternatives = vec![self.compound()?];
                self.skip_ws();
                while self.peek() == Some(',') {
                    self.pos += 1;
                    self.skip_ws();
                    alternatives.push(self.compound()?);
                    self.skip_ws();
                }
                self.expect(')')?;
                Pseudo::Not(alternatives)
            }
            _ => bail!("unsupported pseudo-class :{name} in selector {:?}", self.src)
        })
    }

    fn compound(&mut self) -> Result<Compound> {
        let mut c = Compound::default();
        let start = self.pos;
        match self.peek() {
            Some('*') => {
                self.pos += 1;
            }
            Some(ch) if is_ident_char(ch) => {
                c.tag = Some(KString::from_string(self.ident()?.to_ascii_lowercase()));
            }
            _ => ()
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    c.id = Some(self.ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    c.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    self.skip_ws();
                    let name = KString::from_string(self.ident()?.to_ascii_lowercase());
                    self.skip_ws();
                    let sel = if self.peek() == Some('=') {
                        self.pos += 1;
                        self.skip_ws();
                        let v = self.value()?;
                        self.skip_ws();
                        AttrSel::Equals(name, v)
                    } else {
                        AttrSel::Exists(name)
                    };
                    self.expect(']')?;
                    c.attrs.push(sel);
                }
                Some(':') => {
                    self.pos += 1;
                    c.pseudos.push(self.pseudo()?);
                }
                _ => break
            }
        }
        if self.pos == start {
            match self.peek() {
                Some(ch) => bail!("unexpected {ch:?} at position {} in selector {:?}",
                                  self.pos, self.src),
                None => bail!("selector {:?} ends where a selector was expected",
                              self.src),
            }
        }
        Ok(c)
    }

    fn complex(&mut self) -> Result<Complex> {
        self.skip_ws();
        let mut compounds = vec![self.compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_ws = self.skip_ws();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => Combinator::Child,
                Some('+') => Combinator::Adjacent,
                Some('~') => Combinator::Sibling,
                Some(_) if had_ws => Combinator::Descendant,
                Some(ch) => bail!("unexpected {ch:?} at position {} in selector {:?}",
                                  self.pos, self.src),
            };
            if combinator != Combinator::Descendant {
                self.pos += 1;
                self.skip_ws();
            }
            combinators.push(combinator);
            compounds.push(self.compound()?);
        }
        Ok(Complex { compounds, combinators })
    }
}

impl Selector {
    pub fn parse(src: &str) -> Result<Selector> {
        let mut p = Parser { src, chars: src.chars().collect(), pos: 0 };
        let mut groups = vec![p.complex()?];
        while p.peek() == Some(',') {
            p.pos += 1;
            groups.push(p.complex()?);
        }
        Ok(Selector { groups })
    }

    /// Whether element `id` matches. Ancestors and siblings are looked
    /// up through the whole tree, not just below some scope.
    pub fn matches(&self, dom: &Dom, id: NodeId) -> bool {
        self.groups.iter().any(
            |g| match_at(dom, id, g, g.compounds.len() - 1))
    }
}

/// The element children of `id`'s parent (just `id` if it has none),
/// and `id`'s index among them.
fn element_siblings(dom: &Dom, id: NodeId) -> (Vec<NodeId>, usize) {
    match dom.parent(id) {
        Some(p) => {
            let siblings = dom.element_children(p);
            let i = siblings.iter().position(|s| *s == id).unwrap_or(0);
            (siblings, i)
        }
        None => (vec![id], 0)
    }
}

fn pseudo_matches(dom: &Dom, id: NodeId, p: &Pseudo) -> bool {
    match p {
        Pseudo::FirstChild => element_siblings(dom, id).1 == 0,
        Pseudo::LastChild => {
            let (siblings, i) = element_siblings(dom, id);
            i + 1 == siblings.len()
        }
        Pseudo::NthChild { a, b } =>
            nth_matches(*a, *b, element_siblings(dom, id).1 as i32 + 1),
        Pseudo::Not(alternatives) =>
            ! alternatives.iter().any(|c| compound_matches(dom, id, c)),
    }
}

fn compound_matches(dom: &Dom, id: NodeId, c: &Compound) -> bool {
    let e = match dom.element(id) {
        Some(e) => e,
        None => return false
    };
    if let Some(tag) = &c.tag {
        if e.tag() != tag.as_str() {
            return false
        }
    }
    if let Some(want) = &c.id {
        if e.get_attribute("id") != Some(want.as_str()) {
            return false
        }
    }
    if ! c.classes.is_empty() {
        let have = e.get_attribute("class").unwrap_or("");
        if ! c.classes.iter().all(
            |cl| have.split_ascii_whitespace().any(|h| h == cl.as_str()))
        {
            return false
        }
    }
    c.attrs.iter().all(|a| match a {
        AttrSel::Exists(name) => e.has_attribute(name),
        AttrSel::Equals(name, v) => e.get_attribute(name) == Some(v.as_str()),
    }) && c.pseudos.iter().all(|p| pseudo_matches(dom, id, p))
}

fn element_parent(dom: &Dom, id: NodeId) -> Option<NodeId> {
    dom.parent(id).filter(|p| dom.is_element(*p))
}

fn match_at(dom: &Dom, id: NodeId, g: &Complex, i: usize) -> bool {
    if ! compound_matches(dom, id, &g.compounds[i]) {
        return false
    }
    if i == 0 {
        return true
    }
    match g.combinators[i - 1] {
        Combinator::Child =>
            element_parent(dom, id).map_or(false, |p| match_at(dom, p, g, i - 1)),
        Combinator::Descendant => {
            let mut current = element_parent(dom, id);
            while let Some(p) = current {
                if match_at(dom, p, g, i - 1) {
                    return true
                }
                current = element_parent(dom, p);
            }
            false
        }
        Combinator::Adjacent => {
            let (siblings, idx) = element_siblings(dom, id);
            idx > 0 && match_at(dom, siblings[idx - 1], g, i - 1)
        }
        Combinator::Sibling => {
            let (siblings, idx) = element_siblings(dom, id);
            siblings[..idx].iter().any(|s| match_at(dom, *s, g, i - 1))
        }
    }
}

impl Dom {
    /// All elements below `scope` (excluding it) matching `selector`,
    /// in document order.
    pub fn query_selector_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope).into_iter().filter(
            |id| selector.matches(self, *id)).collect()
    }
}

impl Display for Pseudo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pseudo::FirstChild => f.write_str(":first-child"),
            Pseudo::LastChild => f.write_str(":last-child"),
            Pseudo::NthChild { a: 0, b } => write!(f, ":nth-child({b})"),
            Pseudo::NthChild { a, b: 0 } => write!(f, ":nth-child({a}n)"),
            Pseudo::NthChild { a, b } => write!(f, ":nth-child({a}n{b:+})"),
            Pseudo::Not(alternatives) =>
                write!(f, ":not({})", alternatives.iter().join(", ")),
        }
    }
}

impl Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(t) => f.write_str(t)?,
            None => if self.id.is_none() && self.classes.is_empty() && self.attrs.is_empty()
                && self.pseudos.is_empty()
            {
                f.write_str("*")?
            }
        }
        if let Some(id) = &self.id {
            write!(f, "#{id}")?;
        }
        for c in &self.classes {
            write!(f, ".{c}")?;
        }
        for a in &self.attrs {
            match a {
                AttrSel::Exists(n) => write!(f, "[{n}]")?,
                AttrSel::Equals(n, v) => write!(f, "[{n}=\"{v}\"]")?,
            }
        }
        for p in &self.pseudos {
            write!(f, "{p}")?;
        }
        Ok(())
    }
}

impl Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.compounds[0])?;
        for (comb, c) in self.combinators.iter().zip(&self.compounds[1..]) {
            match comb {
                Combinator::Descendant => write!(f, " {c}")?,
                Combinator::Child => write!(f, " > {c}")?,
                Combinator::Adjacent => write!(f, " + {c}")?,
                Combinator::Sibling => write!(f, " ~ {c}")?,
            }
        }
        Ok(())
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.groups.iter().join(", "))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_fragment;

    fn doc() -> (Dom, NodeId) {
        let mut dom = Dom::new();
        let f = parse_fragment(
            &mut dom,
            "<div id=main><ul class=\"menu top\"><li><button class=go>a</button></li>\
             <li><button data-x=1>b</button></li></ul><button id=solo>c</button></div>")
            .unwrap();
        (dom, f)
    }

    fn texts(dom: &Dom, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|id| dom.text_content(*id)).collect()
    }

    #[test]
    fn t_parse_display() -> Result<()> {
        assert_eq!(Selector::parse("DIV#a.b.c[x][y='z'] > p  span, *")?.to_string(),
                   "div#a.b.c[x][y=\"z\"] > p span, *");
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("a >").is_err());
        assert!(Selector::parse("a[b").is_err());
        assert!(Selector::parse("a,,b").is_err());
        assert!(Selector::parse("a:hover").is_err());
        assert_eq!(Selector::parse("li:FIRST-child, a:nth-child( 2n + 1 ) ~ b:not(.x,#y)+c")?
                   .to_string(),
                   "li:first-child, a:nth-child(2n+1) ~ b:not(.x, #y) + c");
        assert_eq!(Selector::parse(":nth-child(-n+3):last-child")?.to_string(),
                   ":nth-child(-1n+3):last-child");
        assert!(Selector::parse("a:nth-child(x)").is_err());
        assert!(Selector::parse("a:nth-child(2").is_err());
        assert!(Selector::parse("a:not(b").is_err());
        assert!(Selector::parse("a +").is_err());
        Ok(())
    }

    #[test]
    fn t_parse_nth() -> Result<()> {
        assert_eq!(parse_nth("odd")?, (2, 1));
        assert_eq!(parse_nth("EVEN")?, (2, 0));
        assert_eq!(parse_nth("3")?, (0, 3));
        assert_eq!(parse_nth("n")?, (1, 0));
        assert_eq!(parse_nth("-n + 2")?, (-1, 2));
        assert_eq!(parse_nth("3n-1")?, (3, -1));
        assert!(parse_nth("3n1").is_err());
        assert!(nth_matches(-1, 2, 1) && nth_matches(-1, 2, 2) && ! nth_matches(-1, 2, 3));
        assert!(nth_matches(2, 1, 3) && ! nth_matches(2, 1, 2));
        Ok(())
    }

    #[test]
    fn t_query() -> Result<()> {
        let (dom, f) = doc();
        let q = |s: &str| texts(&dom, &dom.query_selector_all(f, &Selector::parse(s).unwrap()));
        assert_eq!(q("button"), vec!["a", "b", "c"]);
        assert_eq!(q(".go"), vec!["a"]);
        assert_eq!(q("ul.menu.top button"), vec!["a", "b"]);
        assert_eq!(q("#main > button"), vec!["c"]);
        assert_eq!(q("div > li"), Vec::<String>::new());
        assert_eq!(q("[data-x=\"1\"]"), vec!["b"]);
        assert_eq!(q("#solo, .go"), vec!["a", "c"]);
        assert_eq!(q("li:first-child button"), vec!["a"]);
        assert_eq!(q("li:last-child > button"), vec!["b"]);
        assert_eq!(q("button:first-child"), vec!["a", "b"]);
        assert_eq!(q("li:nth-child(2) button"), vec!["b"]);
        assert_eq!(q("li:nth-child(odd) button"), vec!["a"]);
        assert_eq!(q("button:not(.go)"), vec!["b", "c"]);
        assert_eq!(q("button:not(.go, #solo)"), vec!["b"]);
        assert_eq!(q("ul + button"), vec!["c"]);
        assert_eq!(q("ul ~ button"), vec!["c"]);
        assert_eq!(q("li + li button"), vec!["b"]);
        assert_eq!(q("li ~ button"), Vec::<String>::new());
        Ok(())
    }

    #[test]
    fn t_scope_is_excluded() -> Result<()> {
        let (dom, f) = doc();
        let div = dom.first_element_child(f).unwrap();
        assert_eq!(dom.query_selector_all(div, &Selector::parse("div")?), vec![]);
        assert_eq!(dom.query_selector_all(f, &Selector::parse("div")?), vec![div]);
        Ok(())
    }
}
