//! Mutable node tree living in an arena. Nodes are referred to by
//! `NodeId`, which carries the generation of its slot: freeing a
//! node bumps the generation, so ids of freed nodes never resolve to
//! a node that later reuses the slot.

use anyhow::{anyhow, bail, Result};
use kstring::KString;

use crate::myfrom::MyFrom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(self) -> u32 { self.index }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: KString,
    attrs: Vec<(KString, KString)>,
}

impl Element {
    /// Lowercase tag name.
    pub fn tag(&self) -> &str { &self.tag }
    pub fn attrs(&self) -> &[(KString, KString)] { &self.attrs }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute(name).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(Element),
    Text(KString),
    Comment(KString),
    /// Parentless container, e.g. for the result of parsing.
    Fragment,
}

impl NodeKind {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<NodeData>,
}

#[derive(Debug, Default)]
pub struct Dom {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

fn lowercase<T>(s: T) -> KString
where KString: MyFrom<T>
{
    let s = KString::myfrom(s);
    if s.bytes().any(|b| b.is_ascii_uppercase()) {
        KString::from_string(s.to_ascii_lowercase())
    } else {
        s
    }
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated (not freed) nodes, attached or not.
    pub fn live_count(&self) -> usize {
        self.live
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let node = Some(NodeData { kind, parent: None, children: Vec::new() });
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = node;
            NodeId { index, generation: slot.generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot { generation: 0, node });
            NodeId { index, generation: 0 }
        }
    }

    pub fn new_element<T, K, V>(
        &mut self,
        tag: T,
        attrs: impl IntoIterator<Item = (K, V)>
    ) -> NodeId
    where KString: MyFrom<T> + MyFrom<K> + MyFrom<V>
    {
        let attrs = attrs.into_iter().map(
            |(k, v)| (lowercase(k), KString::myfrom(v))).collect();
        self.alloc(NodeKind::Element(Element { tag: lowercase(tag), attrs }))
    }

    pub fn new_text<T>(&mut self, s: T) -> NodeId
    where KString: MyFrom<T>
    {
        self.alloc(NodeKind::Text(KString::myfrom(s)))
    }

    pub fn new_comment<T>(&mut self, s: T) -> NodeId
    where KString: MyFrom<T>
    {
        self.alloc(NodeKind::Comment(KString::myfrom(s)))
    }

    pub fn new_fragment(&mut self) -> NodeId {
        self.alloc(NodeKind::Fragment)
    }

    fn data(&self, id: NodeId) -> Option<&NodeData> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation == id.generation {
            slot.node.as_ref()
        } else {
            None
        }
    }

    fn data_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        let slot = self.slots.get_mut(id.index as usize)
            .ok_or_else(|| anyhow!("node id {id:?} is behind the end of the arena"))?;
        if slot.generation != id.generation {
            bail!("node id {id:?} refers to a freed node")
        }
        slot.node.as_mut().ok_or_else(|| anyhow!("node id {id:?} refers to a freed node"))
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.data(id).is_some()
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.data(id).map(|d| &d.kind)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.kind(id).and_then(NodeKind::as_element)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(Element::tag)
    }

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.get_attribute(name))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).and_then(|d| d.parent)
    }

    /// Empty for freed ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.data(id).map(|d| d.children.as_slice()).unwrap_or(&[])
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id).iter().copied().filter(|c| self.is_element(*c)).collect()
    }

    pub fn first_element_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).iter().copied().find(|c| self.is_element(*c))
    }

    /// Whether `node` is `ancestor` or lies below it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true
            }
            current = self.parent(id);
        }
        false
    }

    /// Pre-order list of all nodes below `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev());
        }
        out
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut s = String::new();
        if let Some(NodeKind::Text(t)) = self.kind(id) {
            s.push_str(t);
        }
        for n in self.descendants(id) {
            if let Some(NodeKind::Text(t)) = self.kind(n) {
                s.push_str(t);
            }
        }
        s
    }

    fn check_insertable(&self, parent: NodeId, child: NodeId) -> Result<()> {
        if ! self.is_live(child) {
            bail!("can't insert freed node {child:?}")
        }
        if self.contains(child, parent) {
            bail!("can't insert node {child:?} into itself or one of its descendants")
        }
        match self.kind(parent) {
            Some(NodeKind::Element(_)) | Some(NodeKind::Fragment) => Ok(()),
            Some(_) => bail!("node {parent:?} can't have children"),
            None => bail!("parent {parent:?} refers to a freed node"),
        }
    }

    /// Remove `id` from its parent, if it has one.
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        if let Some(parent) = self.parent(id) {
            self.data_mut(parent)?.children.retain(|c| *c != id);
            self.data_mut(id)?.parent = None;
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_insertable(parent, child)?;
        self.detach(child)?;
        self.data_mut(parent)?.children.push(child);
        self.data_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Insert `child` into `parent` right before `reference`, which
    /// must be a child of `parent`. With `reference` None, appends.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>
    ) -> Result<()> {
        let reference = match reference {
            None => return self.append_child(parent, child),
            Some(r) => r
        };
        if reference == child {
            return Ok(())
        }
        if self.parent(reference) != Some(parent) {
            bail!("reference node {reference:?} is not a child of {parent:?}")
        }
        self.check_insertable(parent, child)?;
        self.detach(child)?;
        let siblings = &mut self.data_mut(parent)?.children;
        let pos = siblings.iter().position(|c| *c == reference)
            .ok_or_else(|| anyhow!("reference node {reference:?} vanished"))?;
        siblings.insert(pos, child);
        self.data_mut(child)?.parent = Some(parent);
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.parent(child) != Some(parent) {
            bail!("node {child:?} is not a child of {parent:?}")
        }
        self.detach(child)
    }

    /// Detach `id` and release it and everything below it; their ids
    /// stop resolving.
    pub fn free_subtree(&mut self, id: NodeId) -> Result<()> {
        if ! self.is_live(id) {
            bail!("free_subtree: node {id:?} was already freed")
        }
        self.detach(id)?;
        let mut nodes = self.descendants(id);
        nodes.push(id);
        for n in nodes {
            let slot = &mut self.slots[n.index as usize];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(n.index);
            self.live -= 1;
        }
        Ok(())
    }

    /// Deep copy of `id` from `src` (which may be another arena) into
    /// this one. The copy is parentless.
    pub fn clone_subtree_from(&mut self, src: &Dom, id: NodeId) -> Result<NodeId> {
        let data = src.data(id)
            .ok_or_else(|| anyhow!("clone: node {id:?} was freed"))?;
        let copy = self.alloc(data.kind.clone());
        for child in &data.children {
            let c = self.clone_subtree_from(src, *child)?;
            self.data_mut(c)?.parent = Some(copy);
            self.data_mut(copy)?.children.push(c);
        }
        Ok(copy)
    }
}
