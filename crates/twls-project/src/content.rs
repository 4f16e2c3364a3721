//! Static extraction of `content` globs and the class separator from a
//! Tailwind config file.
//!
//! Config files are JavaScript or TypeScript. Nothing is evaluated: the
//! source is tokenized and `content` and `separator` are read as direct keys
//! of the exported object (`module.exports =`, `export default`, a
//! `defineConfig(...)` style wrapper, or a variable holding the object).
//! Only plain string literals survive; functions, identifiers, spreads and
//! interpolated template strings are ignored.

use camino::Utf8Path;

use crate::error::DiscoveryError;

/// What a config file says about which documents it styles.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigContent {
    /// Literal content globs, as written.
    pub files: Vec<String>,
    /// `content.relative`: globs resolve against the config's directory
    /// rather than the package root.
    pub relative: bool,
    /// Single-character `separator`, if the config overrides it.
    pub separator: Option<char>,
}

/// Reads a config file's content declaration.
pub trait ConfigLoader: Send + Sync {
    fn load(&self, config_path: &Utf8Path) -> Result<ConfigContent, DiscoveryError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StaticConfigLoader;

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, config_path: &Utf8Path) -> Result<ConfigContent, DiscoveryError> {
        let source = std::fs::read_to_string(config_path)
            .map_err(|err| DiscoveryError::io(config_path, err))?;
        parse_config_source(&source).map_err(|reason| DiscoveryError::Parse {
            path: config_path.to_path_buf(),
            reason,
        })
    }
}

pub fn parse_config_source(source: &str) -> Result<ConfigContent, String> {
    let tokens = tokenize(source)?;
    let parser = Parser { tokens: &tokens };

    let mut content = ConfigContent::default();
    let exported = parser.exported_object();
    let key = |name: &str| match exported {
        Some(object) => parser.find_key_within(object, name),
        None => parser.find_key(name),
    };

    if let Some(start) = key("content") {
        match parser.tokens.get(start) {
            Some(Token::Punct('[')) => content.files = parser.string_array(start),
            Some(Token::Punct('{')) => {
                if let Some(files) = parser.find_key_within(start, "files") {
                    if parser.tokens.get(files) == Some(&Token::Punct('[')) {
                        content.files = parser.string_array(files);
                    }
                }
                if let Some(relative) = parser.find_key_within(start, "relative") {
                    content.relative =
                        parser.tokens.get(relative) == Some(&Token::Ident("true".to_string()));
                }
            }
            Some(Token::Str(glob)) => content.files = vec![glob.clone()],
            _ => {}
        }
    }

    if let Some(start) = key("separator") {
        if let Some(Token::Str(value)) = parser.tokens.get(start) {
            let mut chars = value.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                content.separator = Some(c);
            }
        }
    }

    Ok(content)
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    /// A string literal with no interpolation.
    Str(String),
    /// A template literal containing `${`.
    Template,
    /// A regular expression literal, flags included.
    Regex,
    Ident(String),
    Punct(char),
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                loop {
                    match chars.next() {
                        Some('/') if prev == '*' => break,
                        Some(next) => prev = next,
                        None => return Err("unterminated block comment".to_string()),
                    }
                }
            }
            '/' if starts_regex(tokens.last()) => {
                let mut in_class = false;
                loop {
                    match chars.next() {
                        Some('\\') => {
                            chars.next();
                        }
                        Some('[') => in_class = true,
                        Some(']') => in_class = false,
                        Some('/') if !in_class => break,
                        Some('\n') | None => {
                            return Err("unterminated regular expression".to_string());
                        }
                        Some(_) => {}
                    }
                }
                while chars.peek().is_some_and(|c| c.is_alphanumeric()) {
                    chars.next();
                }
                tokens.push(Token::Regex);
            }
            '"' | '\'' | '`' => {
                let quote = c;
                let mut value = String::new();
                let mut interpolated = false;
                loop {
                    match chars.next() {
                        Some('\\') => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        Some('$') if quote == '`' && chars.peek() == Some(&'{') => {
                            interpolated = true;
                            value.push('$');
                        }
                        Some(next) if next == quote => break,
                        Some(next) => value.push(next),
                        None => return Err("unterminated string literal".to_string()),
                    }
                }
                tokens.push(if interpolated {
                    Token::Template
                } else {
                    Token::Str(value)
                });
            }
            c if c.is_alphanumeric() || c == '_' || c == '$' => {
                let mut ident = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' || next == '$' {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => tokens.push(Token::Punct(other)),
        }
    }

    Ok(tokens)
}

/// A `/` after these tokens opens a regular expression rather than dividing.
fn starts_regex(prev: Option<&Token>) -> bool {
    match prev {
        None => true,
        Some(Token::Punct(c)) => "(,=:[!&|?{};>".contains(*c),
        Some(Token::Ident(ident)) => matches!(ident.as_str(), "return" | "typeof" | "case"),
        Some(_) => false,
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
}

impl Parser<'_> {
    fn is_key(&self, index: usize, name: &str) -> bool {
        let named = match self.tokens.get(index) {
            Some(Token::Ident(ident) | Token::Str(ident)) => ident == name,
            _ => false,
        };
        named && self.tokens.get(index + 1) == Some(&Token::Punct(':'))
    }

    fn is_ident(&self, index: usize, name: &str) -> bool {
        matches!(self.tokens.get(index), Some(Token::Ident(ident)) if ident == name)
    }

    fn is_punct(&self, index: usize, c: char) -> bool {
        self.tokens.get(index) == Some(&Token::Punct(c))
    }

    /// Index of the `{` opening the object the config file exports.
    fn exported_object(&self) -> Option<usize> {
        (0..self.tokens.len()).find_map(|i| {
            let value = if self.is_ident(i, "module")
                && self.is_punct(i + 1, '.')
                && self.is_ident(i + 2, "exports")
                && self.is_punct(i + 3, '=')
            {
                i + 4
            } else if self.is_ident(i, "export") && self.is_ident(i + 1, "default") {
                i + 2
            } else {
                return None;
            };
            self.object_at(value, 0)
        })
    }

    /// Follows the expression at `index` to an object literal: the literal
    /// itself, the first argument of a call, or a variable's initializer.
    fn object_at(&self, index: usize, hops: usize) -> Option<usize> {
        if hops > 4 {
            return None;
        }
        match self.tokens.get(index)? {
            Token::Punct('{') => Some(index),
            Token::Punct('(') => self.object_at(index + 1, hops + 1),
            Token::Ident(_) if self.is_punct(index + 1, '(') => self.object_at(index + 2, hops + 1),
            Token::Ident(name) => {
                let init = self.initializer_of(name)?;
                self.object_at(init, hops + 1)
            }
            _ => None,
        }
    }

    /// Index of the initializer in `const|let|var name [: Type] = ...`.
    fn initializer_of(&self, name: &str) -> Option<usize> {
        let decl = (0..self.tokens.len()).find(|&i| {
            let declares = matches!(
                self.tokens.get(i),
                Some(Token::Ident(kw)) if matches!(kw.as_str(), "const" | "let" | "var")
            );
            declares && self.is_ident(i + 1, name)
        })?;
        (decl + 2..self.tokens.len())
            .take_while(|&i| !self.is_punct(i, ';'))
            .find(|&i| self.is_punct(i, '=') && !self.is_punct(i + 1, '>'))
            .map(|i| i + 1)
    }

    /// Index of the value of the first `name:` pair anywhere in the source.
    fn find_key(&self, name: &str) -> Option<usize> {
        (0..self.tokens.len())
            .find(|&i| self.is_key(i, name))
            .map(|i| i + 2)
    }

    /// Index of the value of `name:` directly inside the object opening at
    /// `open`.
    fn find_key_within(&self, open: usize, name: &str) -> Option<usize> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(open) {
            match token {
                Token::Punct('{' | '[' | '(') => depth += 1,
                Token::Punct('}' | ']' | ')') => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return None;
                    }
                }
                _ if depth == 1 && self.is_key(i, name) => {
                    // keys sit right after `{` or `,`
                    let after_separator = matches!(
                        i.checked_sub(1).and_then(|prev| self.tokens.get(prev)),
                        Some(Token::Punct('{' | ','))
                    );
                    if after_separator {
                        return Some(i + 2);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// String literal elements of the array opening at `open`. Elements that
    /// are anything other than a single string literal are skipped.
    fn string_array(&self, open: usize) -> Vec<String> {
        let mut files = Vec::new();
        let mut depth = 0usize;
        let mut element: Vec<&Token> = Vec::new();

        let mut flush = |element: &mut Vec<&Token>| {
            if let [Token::Str(value)] = element.as_slice() {
                files.push(value.clone());
            }
            element.clear();
        };

        for token in &self.tokens[open..] {
            match token {
                Token::Punct('[' | '{' | '(') => {
                    depth += 1;
                    if depth > 1 {
                        element.push(token);
                    }
                }
                Token::Punct(']' | '}' | ')') => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        flush(&mut element);
                        break;
                    }
                    element.push(token);
                }
                Token::Punct(',') if depth == 1 => flush(&mut element),
                _ => element.push(token),
            }
        }

        files
    }
}
