//! Name resolution.
//!
//! The generator does not decide on its own whether an identifier is a
//! template-local binding or a field of the data context. It asks a
//! [`NameResolver`], which also picks the key a field or property is read from.

/// Lexically scoped local names known at generation time: `for` variables,
/// their `_index`/`_first`/`_last` companions, and `set` bindings.
#[derive(Debug, Clone, Default)]
pub struct LocalScope {
    frames: Vec<Vec<String>>,
}

impl LocalScope {
    pub fn new() -> Self {
        Self {
            frames: vec![Vec::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Declare a name in the innermost frame.
    pub fn declare(&mut self, name: impl Into<String>) {
        if self.frames.is_empty() {
            self.frames.push(Vec::new());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.push(name.into());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.frames.iter().flatten().any(|n| n == name)
    }

    /// Whether `name` was declared in the innermost frame.
    pub fn declared_here(&self, name: &str) -> bool {
        self.frames.last().is_some_and(|f| f.iter().any(|n| n == name))
    }
}

/// How a field or property is read from the data context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Read the key spelled exactly like the template name.
    Direct,
    /// Read a different key.
    Renamed(String),
}

impl Access {
    /// The key to read for `name`.
    pub fn key<'a>(&'a self, name: &'a str) -> &'a str {
        match self {
            Access::Direct => name,
            Access::Renamed(key) => key,
        }
    }
}

/// What a bare identifier refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A template-local binding, used as-is.
    Local,
    /// A field of the data context, read with the given strategy.
    Field(Access),
}

/// Answers "how do I read this name".
pub trait NameResolver {
    fn resolve(&self, name: &str, scope: &LocalScope) -> Resolution;

    /// Access strategy for `object.name`.
    fn property(&self, name: &str) -> Access;
}

/// Locals by lexical scope, everything else read by its verbatim key.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl NameResolver for DefaultResolver {
    fn resolve(&self, name: &str, scope: &LocalScope) -> Resolution {
        if scope.contains(name) {
            Resolution::Local
        } else {
            Resolution::Field(Access::Direct)
        }
    }

    fn property(&self, _name: &str) -> Access {
        Access::Direct
    }
}

/// Reads fields and properties from `snake_case` keys, so `user.firstName`
/// reads `user["first_name"]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeCaseResolver;

impl NameResolver for SnakeCaseResolver {
    fn resolve(&self, name: &str, scope: &LocalScope) -> Resolution {
        if scope.contains(name) {
            Resolution::Local
        } else {
            Resolution::Field(self.property(name))
        }
    }

    fn property(&self, name: &str) -> Access {
        let snake = to_snake_case(name);
        if snake == name {
            Access::Direct
        } else {
            Access::Renamed(snake)
        }
    }
}

/// `firstName` → `first_name`, `HTMLTitle` → `html_title`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1);
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
