pub(crate) const DEFAULT_MAX_DEPTH: usize = 64;

/// How the token reader treats `//` and `/* */` comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentHandling {
    /// A comment is a syntax error.
    #[default]
    Disallow,
    /// Comments are consumed as if they were whitespace.
    Skip,
}

/// Options obeyed by the token reader and document parser.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    pub max_depth: usize,
    pub allow_trailing_commas: bool,
    pub comment_handling: CommentHandling,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn with_allow_trailing_commas(mut self, allow: bool) -> Self {
        self.allow_trailing_commas = allow;
        self
    }

    pub fn with_comment_handling(mut self, comment_handling: CommentHandling) -> Self {
        self.comment_handling = comment_handling;
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            allow_trailing_commas: false,
            comment_handling: CommentHandling::default(),
        }
    }
}

/// Options obeyed by the token writer.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Spaces per indent level; `None` writes compact output.
    pub indent: Option<usize>,
    pub max_depth: usize,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indent(mut self, indent: Option<usize>) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            indent: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// What to do when an object member arrives that the contract does not name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownMembers {
    /// Skip the member's value and continue.
    #[default]
    Ignore,
    /// Fail with [`ErrorKind::UnknownMember`](crate::ErrorKind::UnknownMember).
    Reject,
}

/// What to do when an object member appears twice in one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateMembers {
    /// Keep the value from the last occurrence.
    #[default]
    LastWins,
    /// Fail with [`ErrorKind::DuplicateMember`](crate::ErrorKind::DuplicateMember).
    Reject,
}

/// Policies applied by the typed read/write engine, on top of the syntax
/// options.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedOptions {
    pub unknown_members: UnknownMembers,
    pub duplicate_members: DuplicateMembers,
    /// Baseline number coercion; individual contracts may override it.
    pub number_handling: crate::num::NumberHandling,
}

impl TypedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unknown_members(mut self, unknown_members: UnknownMembers) -> Self {
        self.unknown_members = unknown_members;
        self
    }

    pub fn with_duplicate_members(mut self, duplicate_members: DuplicateMembers) -> Self {
        self.duplicate_members = duplicate_members;
        self
    }

    pub fn with_number_handling(mut self, number_handling: crate::num::NumberHandling) -> Self {
        self.number_handling = number_handling;
        self
    }
}
