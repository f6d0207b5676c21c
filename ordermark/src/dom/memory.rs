use crate::dom::{
    Element, Host, MutationObserver, MutationRecord, NavigationEvent, Position,
    selector::{Matchable, SelectorList},
};
use fnv::FnvHashMap;
use ordermark_integration::channel::{Tx, UnboundedTx};
use parking_lot::{Mutex, RwLock};
use smol_str::SmolStr;
use std::{
    fmt::{Debug, Formatter},
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::warn;
use url::Url;

#[derive(Debug)]
struct Node {
    tag: SmolStr,
    attributes: Vec<(SmolStr, String)>,
    text: String,
    hidden: bool,
    parent: Weak<RwLock<Node>>,
    children: Vec<Arc<RwLock<Node>>>,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: SmolStr::new(tag),
            attributes: Vec::new(),
            text: String::new(),
            hidden: false,
            parent: Weak::new(),
            children: Vec::new(),
        }
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug)]
struct Document {
    root: Arc<RwLock<Node>>,
    location: RwLock<Url>,
    observers: Mutex<FnvHashMap<u64, UnboundedTx<MutationRecord<MemoryElement>>>>,
    next_observer: AtomicU64,
    navigation: Mutex<Option<UnboundedTx<NavigationEvent<MemoryElement>>>>,
}

impl Document {
    fn is_attached(&self, node: &Arc<RwLock<Node>>) -> bool {
        let mut current = Arc::clone(node);
        loop {
            if Arc::ptr_eq(&current, &self.root) {
                return true;
            }
            let parent = current.read().parent.upgrade();
            match parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn notify(&self, record: MutationRecord<MemoryElement>) {
        if !self.is_attached(&record.target.node) {
            return;
        }

        self.observers
            .lock()
            .retain(|_, tx| tx.send(record.clone()).is_ok());
    }

    fn navigate(&self, event: NavigationEvent<MemoryElement>) {
        let mut navigation = self.navigation.lock();
        if let Some(tx) = navigation.as_ref()
            && tx.send(event).is_err()
        {
            *navigation = None;
        }
    }
}

/// Handle to one node of a [`MemoryHost`] document.
#[derive(Clone)]
pub struct MemoryElement {
    node: Arc<RwLock<Node>>,
    document: Arc<Document>,
}

impl Debug for MemoryElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let node = self.node.read();
        f.debug_struct("MemoryElement")
            .field("tag", &node.tag)
            .field("class", &node.attribute("class").unwrap_or_default())
            .finish()
    }
}

impl MemoryElement {
    fn wrap(&self, node: Arc<RwLock<Node>>) -> Self {
        Self {
            node,
            document: Arc::clone(&self.document),
        }
    }

    fn descendants(&self) -> Vec<Self> {
        let mut output = Vec::new();
        let mut stack: Vec<Arc<RwLock<Node>>> =
            self.node.read().children.iter().rev().cloned().collect();

        while let Some(node) = stack.pop() {
            stack.extend(node.read().children.iter().rev().cloned());
            output.push(self.wrap(node));
        }

        output
    }

    fn attach(&self, node: Arc<RwLock<Node>>, position: Position) -> Self {
        node.write().parent = Arc::downgrade(&self.node);
        {
            let mut this = self.node.write();
            match position {
                Position::First => this.children.insert(0, Arc::clone(&node)),
                Position::Last => this.children.push(Arc::clone(&node)),
            }
        }

        let child = self.wrap(node);
        self.document.notify(MutationRecord {
            target: self.clone(),
            added: vec![child.clone()],
            removed: vec![],
        });
        child
    }

    /// Build the [`NodeBuilder`] tree and append it as the last child of `self`.
    ///
    /// Emits one [`MutationRecord`] for the subtree root.
    pub fn append(&self, builder: NodeBuilder) -> Self {
        self.attach(builder.build(), Position::Last)
    }

    /// Build the [`NodeBuilder`] tree and insert it as the first child of `self`.
    pub fn prepend(&self, builder: NodeBuilder) -> Self {
        self.attach(builder.build(), Position::First)
    }

    /// Remove every child of `self`, emitting one [`MutationRecord`].
    pub fn clear_children(&self) {
        let removed = std::mem::take(&mut self.node.write().children);
        for child in &removed {
            child.write().parent = Weak::new();
        }

        let removed: Vec<_> = removed.into_iter().map(|node| self.wrap(node)).collect();
        self.document.notify(MutationRecord {
            target: self.clone(),
            added: vec![],
            removed,
        });
    }

    pub fn tag(&self) -> SmolStr {
        self.node.read().tag.clone()
    }
}

impl Matchable for MemoryElement {
    fn tag_name(&self) -> SmolStr {
        self.tag()
    }

    fn class_contains(&self, class: &str) -> bool {
        self.has_class(class)
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.attribute(name)
    }

    fn parent_node(&self) -> Option<Self> {
        self.parent()
    }
}

fn parse_selector(selector: &str) -> Option<SelectorList> {
    match SelectorList::parse(selector) {
        Ok(selector) => Some(selector),
        Err(error) => {
            warn!(selector, %error, "invalid CSS selector");
            None
        }
    }
}

impl Element for MemoryElement {
    fn select_all(&self, selector: &str) -> Vec<Self> {
        let Some(selector) = parse_selector(selector) else {
            return vec![];
        };

        self.descendants()
            .into_iter()
            .filter(|element| selector.matches(element))
            .collect()
    }

    fn matches(&self, selector: &str) -> bool {
        parse_selector(selector).is_some_and(|selector| selector.matches(self))
    }

    fn text(&self) -> String {
        let node = self.node.read();
        let mut text = node.text.clone();
        let children = node.children.clone();
        drop(node);

        for child in children {
            text.push_str(&self.wrap(child).text());
        }
        text
    }

    fn set_text(&self, text: &str) {
        let removed = {
            let mut node = self.node.write();
            node.text = text.to_string();
            std::mem::take(&mut node.children)
        };
        for child in &removed {
            child.write().parent = Weak::new();
        }

        let removed = removed.into_iter().map(|node| self.wrap(node)).collect();
        self.document.notify(MutationRecord {
            target: self.clone(),
            added: vec![],
            removed,
        });
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.node.read().attribute(name).map(str::to_string)
    }

    fn set_attribute(&self, name: &str, value: &str) {
        let mut node = self.node.write();
        match node.attributes.iter().position(|(key, _)| key == name) {
            Some(index) => node.attributes[index].1 = value.to_string(),
            None => node
                .attributes
                .push((SmolStr::new(name), value.to_string())),
        }
    }

    fn remove_attribute(&self, name: &str) {
        self.node.write().attributes.retain(|(key, _)| key != name);
    }

    fn has_class(&self, class: &str) -> bool {
        self.node
            .read()
            .attribute("class")
            .is_some_and(|classes| classes.split_whitespace().any(|next| next == class))
    }

    fn parent(&self) -> Option<Self> {
        let parent = self.node.read().parent.upgrade();
        parent.map(|parent| self.wrap(parent))
    }

    fn children(&self) -> Vec<Self> {
        let children = self.node.read().children.clone();
        children.into_iter().map(|child| self.wrap(child)).collect()
    }

    fn insert_element(&self, class: &str, position: Position) -> Self {
        self.attach(NodeBuilder::new("div").class(class).build(), position)
    }

    fn remove(&self) {
        let Some(parent) = self.parent() else {
            return;
        };

        parent
            .node
            .write()
            .children
            .retain(|child| !Arc::ptr_eq(child, &self.node));

        self.document.notify(MutationRecord {
            target: parent,
            added: vec![],
            removed: vec![self.clone()],
        });

        self.node.write().parent = Weak::new();
    }

    fn set_hidden(&self, hidden: bool) {
        self.node.write().hidden = hidden;
    }

    fn is_hidden(&self) -> bool {
        self.node.read().hidden
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

/// Declarative description of a node subtree appended to a [`MemoryElement`].
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    tag: SmolStr,
    classes: Vec<SmolStr>,
    attributes: Vec<(SmolStr, String)>,
    text: String,
    children: Vec<NodeBuilder>,
}

impl NodeBuilder {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: SmolStr::new(tag),
            classes: Vec::new(),
            attributes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// Add one or more whitespace separated classes.
    pub fn class(mut self, class: &str) -> Self {
        self.classes
            .extend(class.split_whitespace().map(SmolStr::new));
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes
            .push((SmolStr::new(name), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn child(mut self, child: NodeBuilder) -> Self {
        self.children.push(child);
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = NodeBuilder>,
    {
        self.children.extend(children);
        self
    }

    fn build(self) -> Arc<RwLock<Node>> {
        let mut node = Node::new(&self.tag);
        node.text = self.text;
        node.attributes = self.attributes;
        if !self.classes.is_empty() {
            node.attributes
                .push((SmolStr::new_static("class"), self.classes.join(" ")));
        }

        let node = Arc::new(RwLock::new(node));
        let children = self
            .children
            .into_iter()
            .map(|child| {
                let child = child.build();
                child.write().parent = Arc::downgrade(&node);
                child
            })
            .collect();
        node.write().children = children;
        node
    }
}

/// Shorthand for [`NodeBuilder::new`].
pub fn node(tag: &str) -> NodeBuilder {
    NodeBuilder::new(tag)
}

/// In-memory [`Host`] whose document, location & navigation events are driven programmatically.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    document: Arc<Document>,
}

impl MemoryHost {
    /// Construct a [`MemoryHost`] with an empty `html > body` document at `location`.
    pub fn new(location: Url) -> Self {
        let root = NodeBuilder::new("html").child(NodeBuilder::new("body")).build();
        Self {
            document: Arc::new(Document {
                root,
                location: RwLock::new(location),
                observers: Mutex::new(FnvHashMap::default()),
                next_observer: AtomicU64::new(0),
                navigation: Mutex::new(None),
            }),
        }
    }

    pub fn body(&self) -> MemoryElement {
        let root = self.root();
        root.children()
            .into_iter()
            .next()
            .unwrap_or(root)
    }

    /// Change the location without emitting any event, as frameworks that bypass the history API
    /// do.
    pub fn set_location(&self, location: Url) {
        *self.document.location.write() = location;
    }

    pub fn push_state(&self, location: Url) {
        self.set_location(location);
        self.document.navigate(NavigationEvent::PushState);
    }

    pub fn replace_state(&self, location: Url) {
        self.set_location(location);
        self.document.navigate(NavigationEvent::ReplaceState);
    }

    pub fn pop_state(&self, location: Url) {
        self.set_location(location);
        self.document.navigate(NavigationEvent::PopState);
    }

    pub fn hash_change(&self, location: Url) {
        self.set_location(location);
        self.document.navigate(NavigationEvent::HashChange);
    }

    pub fn click(&self, element: &MemoryElement) {
        self.document.navigate(NavigationEvent::Click(element.clone()));
    }

    /// Drop the navigation subscriber, ending its event feed.
    pub fn close_navigation(&self) {
        self.document.navigation.lock().take();
    }

    /// Number of connected mutation observers.
    pub fn observer_count(&self) -> usize {
        self.document.observers.lock().len()
    }
}

impl Host for MemoryHost {
    type Element = MemoryElement;
    type Observer = MemoryObserver;

    fn root(&self) -> Self::Element {
        MemoryElement {
            node: Arc::clone(&self.document.root),
            document: Arc::clone(&self.document),
        }
    }

    fn location(&self) -> Url {
        self.document.location.read().clone()
    }

    fn subscribe(&self, tx: UnboundedTx<NavigationEvent<Self::Element>>) {
        *self.document.navigation.lock() = Some(tx);
    }

    fn observe_mutations(&self, tx: UnboundedTx<MutationRecord<Self::Element>>) -> Self::Observer {
        let id = self.document.next_observer.fetch_add(1, Ordering::Relaxed);
        self.document.observers.lock().insert(id, tx);
        MemoryObserver {
            id,
            document: Arc::downgrade(&self.document),
        }
    }
}

#[derive(Debug)]
pub struct MemoryObserver {
    id: u64,
    document: Weak<Document>,
}

impl MutationObserver for MemoryObserver {
    fn disconnect(&mut self) {
        if let Some(document) = self.document.upgrade() {
            document.observers.lock().remove(&self.id);
        }
    }
}

impl Drop for MemoryObserver {
    fn drop(&mut self) {
        self.disconnect();
    }
}
