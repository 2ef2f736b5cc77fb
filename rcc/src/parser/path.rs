//! Path parsing

use super::tokens::{ident, kw, sep, P};
use crate::ast::{Path, PathSegment};

pub fn path_parser() -> P<Path> {
    let segment = ident()
        .map(PathSegment::Ident)
        .or_else(&kw("Self").map(|t| PathSegment::SelfType(t.span)))
        .or_else(&kw("self").map(|t| PathSegment::SelfValue(t.span)))
        .label("path segment");

    segment.sep_by1(&sep("::")).map(Path::new).label("path")
}
