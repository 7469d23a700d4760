// ==============================================================================
// Provenance and Blame Chains
// ==============================================================================
//
// Every flow carries a blame chain: the root operation that caused it plus a
// stack of structural frames pushed while decomposing. Chains are persistent
// (shared tails), so pushing a frame is one allocation. Blame never takes part
// in equality of bounds or cache keys; the first chain recorded for a bound is
// the one reported.

use std::fmt;
use std::sync::Arc;

use derive_more::Debug;
use smol_str::SmolStr;

/// Identity of a call site or syntactic position, supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[debug("site{_0}")]
pub struct SiteId(pub u32);

impl From<u32> for SiteId {
    #[inline]
    fn from(value: u32) -> Self {
        SiteId(value)
    }
}

/// Where a type came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("{desc} @ {site:?}")]
pub struct Reason {
    pub desc: SmolStr,
    pub site: SiteId,
}

impl Reason {
    pub fn new(desc: impl Into<SmolStr>, site: SiteId) -> Self {
        Self {
            desc: desc.into(),
            site,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlameOp {
    Cast,
    Assignment,
    FunCallParam,
    FunReturn,
    GetProperty,
    SetProperty,
    Call,
    Construct,
    Spread,
    Unify,
    Internal,
}

impl fmt::Display for BlameOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlameOp::Cast => "cast",
            BlameOp::Assignment => "assignment",
            BlameOp::FunCallParam => "argument",
            BlameOp::FunReturn => "return",
            BlameOp::GetProperty => "property read",
            BlameOp::SetProperty => "property write",
            BlameOp::Call => "call",
            BlameOp::Construct => "construction",
            BlameOp::Spread => "spread",
            BlameOp::Unify => "type equality",
            BlameOp::Internal => "internal constraint",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlameFrame {
    PropertyCompatibility { name: SmolStr },
    FunParam { index: usize },
    FunRest,
    FunReturn,
    ArrayElement,
    TupleElement { index: usize },
    TypeArg { name: SmolStr },
    UnionMember { index: usize },
    Overload { index: usize },
    Instantiation,
}

impl fmt::Display for BlameFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlameFrame::PropertyCompatibility { name } => write!(f, "property `{name}`"),
            BlameFrame::FunParam { index } => write!(f, "parameter {index}"),
            BlameFrame::FunRest => f.write_str("rest parameter"),
            BlameFrame::FunReturn => f.write_str("return value"),
            BlameFrame::ArrayElement => f.write_str("array element"),
            BlameFrame::TupleElement { index } => write!(f, "tuple element {index}"),
            BlameFrame::TypeArg { name } => write!(f, "type argument `{name}`"),
            BlameFrame::UnionMember { index } => write!(f, "union member {index}"),
            BlameFrame::Overload { index } => write!(f, "overload {index}"),
            BlameFrame::Instantiation => f.write_str("instantiation"),
        }
    }
}

#[derive(Debug)]
enum BlameNode {
    #[debug("{op:?} @ {site:?}")]
    Root { op: BlameOp, site: SiteId },
    #[debug("{parent:?} > {frame:?}")]
    Frame { frame: BlameFrame, parent: Blame },
}

/// A persistent blame chain.
#[derive(Debug, Clone)]
#[debug("{_0:?}")]
pub struct Blame(Arc<BlameNode>);

impl Blame {
    pub fn new(op: BlameOp, site: SiteId) -> Self {
        Blame(Arc::new(BlameNode::Root { op, site }))
    }

    /// Blame for constraints the solver itself introduces.
    pub fn internal() -> Self {
        Self::new(BlameOp::Internal, SiteId(0))
    }

    #[must_use]
    pub fn push(&self, frame: BlameFrame) -> Self {
        Blame(Arc::new(BlameNode::Frame {
            frame,
            parent: self.clone(),
        }))
    }

    pub fn root(&self) -> (BlameOp, SiteId) {
        let mut node = &*self.0;
        loop {
            match node {
                BlameNode::Root { op, site } => return (*op, *site),
                BlameNode::Frame { parent, .. } => node = &parent.0,
            }
        }
    }

    pub fn op(&self) -> BlameOp {
        self.root().0
    }

    pub fn site(&self) -> SiteId {
        self.root().1
    }

    /// Frames from the root outwards.
    pub fn frames(&self) -> Vec<BlameFrame> {
        let mut out = Vec::new();
        let mut node = &*self.0;
        while let BlameNode::Frame { frame, parent } = node {
            out.push(frame.clone());
            node = &parent.0;
        }
        out.reverse();
        out
    }

    pub fn last_frame(&self) -> Option<&BlameFrame> {
        match &*self.0 {
            BlameNode::Frame { frame, .. } => Some(frame),
            BlameNode::Root { .. } => None,
        }
    }
}

impl fmt::Display for Blame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (op, site) = self.root();
        write!(f, "{op} at site {}", site.0)?;
        for frame in self.frames() {
            write!(f, " > {frame}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_ordered_from_root() {
        let b = Blame::new(BlameOp::Call, SiteId(7))
            .push(BlameFrame::FunParam { index: 1 })
            .push(BlameFrame::PropertyCompatibility { name: "x".into() });
        assert_eq!(b.site(), SiteId(7));
        assert_eq!(b.op(), BlameOp::Call);
        assert_eq!(
            b.frames(),
            vec![
                BlameFrame::FunParam { index: 1 },
                BlameFrame::PropertyCompatibility { name: "x".into() },
            ]
        );
        assert_eq!(b.to_string(), "call at site 7 > parameter 1 > property `x`");
    }

    #[test]
    fn pushing_shares_the_tail() {
        let base = Blame::new(BlameOp::Assignment, SiteId(1));
        let a = base.push(BlameFrame::ArrayElement);
        let b = base.push(BlameFrame::FunReturn);
        assert_eq!(a.frames().len(), 1);
        assert_eq!(b.frames().len(), 1);
        assert!(base.frames().is_empty());
        assert_eq!(b.last_frame(), Some(&BlameFrame::FunReturn));
    }
}
