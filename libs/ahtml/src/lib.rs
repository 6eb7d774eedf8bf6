//! Html dom abstraction for live fragments: a mutable node tree with
//! stable, generation-checked ids, plus parsing, serialization,
//! selector queries and event listener bookkeeping on top of it.

pub mod myfrom;
pub mod dom;
pub mod parse;
pub mod print;
pub mod selector;
pub mod event;

pub use dom::{Dom, NodeId, NodeKind, Element};
pub use event::{EventRegistry, Subscription};
pub use parse::{parse_fragment, strip_whitespace_text, remove_elements_by_tag};
pub use print::{print_html_fragment, to_html_string, nodes_to_html_string, is_void_element};
pub use selector::Selector;
