use ptree::TreeItem;
use std::fmt::{Debug, Display, Formatter};

/// One node of the output forest: a production applied over a span of input.
#[derive(Clone, PartialEq, Eq)]
pub struct ProductionMatch {
    pub production: String,
    pub value: String,
    pub start_position: usize,
    pub end_position: usize,
    pub children: Vec<ProductionMatch>,
}

impl ProductionMatch {
    pub fn new(
        production: impl Into<String>,
        value: impl Into<String>,
        start_position: usize,
        end_position: usize,
        children: Vec<ProductionMatch>,
    ) -> Self {
        Self {
            production: production.into(),
            value: value.into(),
            start_position,
            end_position,
            children,
        }
    }

    /// Create a leaf match over a single token.
    pub fn leaf(
        production: impl Into<String>,
        value: impl Into<String>,
        start_position: usize,
        end_position: usize,
    ) -> Self {
        ProductionMatch::new(production, value, start_position, end_position, Vec::with_capacity(0))
    }

    /// Whether this tree contains a node for `production`, itself included.
    pub fn contains(&self, production: &str) -> bool {
        self.production == production || self.children.iter().any(|child| child.contains(production))
    }

    /// Find the first node for `production` searching depth first.
    pub fn find(&self, production: &str) -> Option<&ProductionMatch> {
        if self.production == production {
            Some(self)
        } else {
            self.children.iter().find_map(|child| child.find(production))
        }
    }

    /// All nodes satisfying `predicate`, in depth-first order.
    pub fn list<TF: Fn(&ProductionMatch) -> bool>(&self, predicate: &TF) -> Vec<&ProductionMatch> {
        let mut out = Vec::new();
        self.walk(&mut out, predicate);
        out
    }

    pub fn get_child(&self, production: &str) -> Option<&ProductionMatch> {
        self.children.iter().find(|child| child.production == production)
    }

    fn walk<'this, TF: Fn(&ProductionMatch) -> bool>(
        &'this self,
        out: &mut Vec<&'this ProductionMatch>,
        predicate: &TF,
    ) {
        if predicate(self) {
            out.push(self);
        }
        for child in &self.children {
            child.walk(out, predicate);
        }
    }
}

impl Debug for ProductionMatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut debug_struct = f.debug_struct("ProductionMatch");
        debug_struct
            .field("production", &self.production)
            .field("value", &self.value)
            .field("start", &self.start_position)
            .field("end", &self.end_position);
        if !self.children.is_empty() {
            debug_struct.field("children", &self.children);
        }
        debug_struct.finish()
    }
}

impl Display for ProductionMatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.children.is_empty() {
            write!(f, "{}({:?})", self.production, self.value)
        } else {
            write!(f, "{}(", self.production)?;
            for (index, child) in self.children.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", child)?;
            }
            write!(f, ")")
        }
    }
}

impl TreeItem for ProductionMatch {
    type Child = Self;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &ptree::Style) -> std::io::Result<()> {
        write!(
            f,
            "{} # {}-{}",
            self.production, self.start_position, self.end_position
        )
    }

    fn children(&self) -> std::borrow::Cow<[Self::Child]> {
        std::borrow::Cow::from(&self.children)
    }
}

impl ProductionMatch {
    pub fn print(&self) -> Result<(), std::io::Error> {
        ptree::print_tree(self)
    }
}
