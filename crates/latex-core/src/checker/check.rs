//! Checking rules applied to the tokens of one line.

use crate::buffer::LineHandle;
use crate::database::{CommandDatabase, category};
use crate::environment::{DELIMITER_MATH, Environment, StackEnvironment};
use crate::overlay::{SyntaxError, SyntaxErrorKind, format};
use crate::token::{Token, TokenKind, TokenSubtype};

/// What a line is checked against.
#[derive(Debug, Clone, Copy)]
pub struct LineContext<'a> {
    /// Database used to classify commands and environments.
    pub db: &'a CommandDatabase,
    /// The line being checked; environments opened here are anchored to it.
    pub line: Option<&'a LineHandle>,
    /// Emit highlight markers for delimiter math.
    pub math_highlight: bool,
}

/// Check one line, updating `envs` from the incoming to the outgoing environment stack.
pub fn check_line(
    text: &str,
    tokens: &[Token],
    envs: &mut StackEnvironment,
    ctx: &LineContext<'_>,
) -> Vec<SyntaxError> {
    LineChecker {
        text,
        tokens,
        envs,
        ctx,
        errors: Vec::new(),
        too_many: None,
        math_start: None,
        last_key: None,
    }
    .run()
}

struct LineChecker<'a, 'c> {
    text: &'a str,
    tokens: &'a [Token],
    envs: &'a mut StackEnvironment,
    ctx: &'a LineContext<'c>,
    errors: Vec<SyntaxError>,
    /// Index of a too-many-columns error whose range is still being extended.
    too_many: Option<usize>,
    /// Column of a math delimiter opened on this line.
    math_start: Option<usize>,
    last_key: Option<&'a str>,
}

impl<'a> LineChecker<'a, '_> {
    fn run(mut self) -> Vec<SyntaxError> {
        let line_end = self
            .tokens
            .iter()
            .find(|t| t.kind == TokenKind::Comment)
            .map_or(self.text.len(), |t| t.start);

        let tokens = self.tokens;
        for (index, token) in tokens.iter().enumerate() {
            match token.kind {
                TokenKind::Braces
                    if token.subtype == TokenSubtype::BeginEnv && token.belongs_to("\\begin") =>
                {
                    self.begin_environment(index, token);
                }
                TokenKind::Braces
                    if token.subtype == TokenSubtype::EndEnv && token.belongs_to("\\end") =>
                {
                    self.end_environment(index, token);
                }
                TokenKind::Braces
                    if token.subtype == TokenSubtype::ColDef
                        && token.command_name().starts_with("\\begin{") =>
                {
                    self.column_definition(token);
                }
                TokenKind::KeyValKey => self.key(token),
                TokenKind::KeyValValue => self.value(token),
                _ if token.subtype.suppresses_checking() => {}
                TokenKind::Math => {
                    self.math_delimiter(token);
                }
                TokenKind::Symbol if token.text(self.text) == "&" => self.cell_separator(token),
                TokenKind::Command => self.command(index, token),
                _ => {}
            }
        }

        self.extend_too_many(line_end);
        if self.ctx.math_highlight && self.envs.top().is_delimiter_math() {
            let start = self.math_start.unwrap_or(0);
            if line_end > start {
                let display = is_display(&self.envs.top().original_name);
                self.errors
                    .push(SyntaxError::highlight(start, line_end - start, display));
            }
        }
        self.errors
    }

    fn error(&mut self, kind: SyntaxErrorKind, start: usize, length: usize) {
        self.errors.push(SyntaxError::new(kind, start, length));
    }

    fn begin_environment(&mut self, index: usize, group: &Token) {
        let name = group.inner_text(self.text).trim();
        if name.is_empty() {
            return;
        }
        let anchor = self.tokens[..index]
            .iter()
            .rev()
            .find(|t| t.kind == TokenKind::Command && t.text(self.text) == "\\begin")
            .map_or(group.start, |t| t.start);
        if !self.ctx.db.is_environment(name) {
            let inner_start = group.start + usize::from(self.text[group.start..].starts_with('{'));
            self.error(
                SyntaxErrorKind::UnrecognizedEnvironment,
                inner_start,
                name.len(),
            );
        }
        let mut env = Environment::new(name, self.ctx.line.cloned(), anchor);
        env.level = group.level;
        self.envs.push(env);
    }

    fn end_environment(&mut self, index: usize, group: &Token) {
        let name = group.inner_text(self.text).trim();
        let anchor = self.tokens[..index]
            .iter()
            .rev()
            .find(|t| t.kind == TokenKind::Command && t.text(self.text) == "\\end")
            .map_or(group.start, |t| t.start);
        let db = self.ctx.db;
        let top = self.envs.top();
        // Aliases only match when declared both ways; `\end{enumerate}` never closes `itemize`.
        let matches = !self.envs.is_baseline()
            && (top.original_name == name
                || (!top.is_delimiter_math()
                    && db.environment_is(name, &top.name)
                    && db.environment_is(&top.name, name)));
        if !matches {
            self.error(
                SyntaxErrorKind::ClosingUnopenedEnvironment,
                anchor,
                group.end() - anchor,
            );
            return;
        }
        if top.id > 0 {
            self.extend_too_many(anchor);
        }
        self.envs.pop();
    }

    fn column_definition(&mut self, group: &Token) {
        let owner = group.command_name();
        let Some(env) = owner
            .strip_prefix("\\begin{")
            .and_then(|s| s.strip_suffix('}'))
        else {
            return;
        };
        let top = self.envs.top_mut();
        if top.name == env {
            top.id = i32::try_from(count_columns(group.inner_text(self.text), self.ctx.db))
                .unwrap_or(i32::MAX);
            top.excess_col = 0;
        }
    }

    /// Returns `true` if `token` sits directly in the innermost environment and that
    /// environment counts columns.
    fn in_column_row(&self, token: &Token) -> bool {
        let top = self.envs.top();
        top.id > 0 && token.level == top.level
    }

    fn cell_separator(&mut self, token: &Token) {
        if !self.in_column_row(token) {
            return;
        }
        self.add_cells(1, token);
    }

    fn add_cells(&mut self, cells: i32, token: &Token) {
        let top = self.envs.top_mut();
        let before = top.excess_col;
        top.excess_col = top.excess_col.saturating_add(cells);
        let (after, id) = (top.excess_col, top.id);
        if before < id && after >= id && self.too_many.is_none() {
            self.too_many = Some(self.errors.len());
            self.error(SyntaxErrorKind::TooManyColumns, token.start, token.length);
        }
    }

    /// Stretch the open too-many-columns error up to `end` (exclusive, trailing blanks dropped).
    fn extend_too_many(&mut self, end: usize) {
        let Some(index) = self.too_many.take() else {
            return;
        };
        let error = &mut self.errors[index];
        let end = error.start + self.text[error.start..end.max(error.start)].trim_end().len();
        error.length = error.length.max(end - error.start);
    }

    fn line_break(&mut self, token: &Token) {
        if !self.in_column_row(token) {
            return;
        }
        self.extend_too_many(token.start);
        let top = self.envs.top_mut();
        let short = top.excess_col + 1 < top.id;
        top.excess_col = 0;
        if short {
            self.error(SyntaxErrorKind::TooFewColumns, token.start, token.length);
        }
    }

    fn row_rule(&mut self, token: &Token) {
        if self.in_column_row(token) && self.envs.top().excess_col > 0 {
            self.error(SyntaxErrorKind::MissingLinebreak, token.start, token.length);
        }
    }

    fn multicolumn(&mut self, index: usize, token: &Token) {
        if !self.in_column_row(token) {
            return;
        }
        let name = token.text(self.text);
        let span = self.tokens[index + 1..]
            .iter()
            .find(|t| t.kind.is_group() && t.belongs_to(name) && t.arg_index == 0)
            .and_then(|t| t.inner_text(self.text).trim().parse::<i32>().ok())
            .unwrap_or(1);
        if span > 1 {
            self.add_cells(span - 1, token);
        }
    }

    /// `$`, `$$`, `\(`, `\)`, `\[`, `\]`. Returns `false` if `token` is not a math delimiter.
    fn math_delimiter(&mut self, token: &Token) -> bool {
        let db = self.ctx.db;
        let delimiter = token.text(self.text);
        let top = self.envs.top();
        if top.is_delimiter_math() && db.math_close_for(&top.original_name) == Some(delimiter) {
            let display = is_display(&top.original_name);
            let start = self.math_start.take().unwrap_or(0);
            self.envs.pop();
            if self.ctx.math_highlight {
                self.errors
                    .push(SyntaxError::highlight(start, token.end() - start, display));
            }
            return true;
        }
        if db.math_close_for(delimiter).is_some() {
            let mut env = Environment::new(DELIMITER_MATH, self.ctx.line.cloned(), token.start);
            env.original_name = delimiter.to_string();
            env.level = token.level;
            self.envs.push(env);
            self.math_start = Some(token.start);
            return true;
        }
        if db.is_math_close(delimiter) {
            self.error(
                SyntaxErrorKind::ClosingUnopenedEnvironment,
                token.start,
                token.length,
            );
            return true;
        }
        false
    }

    fn command(&mut self, index: usize, token: &Token) {
        if self.math_delimiter(token) {
            return;
        }
        let db = self.ctx.db;
        let name = token.text(self.text);
        if db.in_category(category::LINEBREAK, name) {
            self.line_break(token);
        }
        if db.in_category(category::ROW_RULE, name) {
            self.row_rule(token);
        }
        if db.in_category(category::MULTICOLUMN, name) {
            self.multicolumn(index, token);
        }

        let mut categories = db.categories_of(name).peekable();
        if categories.peek().is_none() {
            self.error(SyntaxErrorKind::UnrecognizedCommand, token.start, token.length);
            return;
        }
        let placement: Vec<&str> = categories.filter(|c| !c.starts_with('%')).collect();
        if placement.is_empty()
            || placement
                .iter()
                .any(|c| *c == category::NORMAL || *c == category::USER)
        {
            return;
        }
        let in_math = token.subtype == TokenSubtype::Formula || self.envs.in_math(db);
        let valid = placement.iter().any(|c| {
            if *c == category::MATH {
                in_math
            } else {
                self.envs.contains(db, c)
            }
        });
        if valid {
            return;
        }
        let kind = if placement.contains(&category::MATH) {
            SyntaxErrorKind::MathCommandOutsideMath
        } else if placement.contains(&category::TABULAR) {
            SyntaxErrorKind::TabularCommandOutsideTabular
        } else if placement.contains(&category::TABBING) {
            SyntaxErrorKind::TabularCommandOutsideTabbing
        } else {
            SyntaxErrorKind::CommandOutsideSuitableEnvironment
        };
        self.error(kind, token.start, token.length);
    }

    fn key(&mut self, token: &'a Token) {
        let key = token.text(self.text);
        self.last_key = Some(key);
        let accepted = self
            .ctx
            .db
            .keys_for(token.command_name())
            .is_none_or(|keys| keys.contains(key));
        if !accepted {
            self.error(SyntaxErrorKind::UnrecognizedKey, token.start, token.length);
        }
    }

    fn value(&mut self, token: &Token) {
        let Some(key) = self.last_key else {
            return;
        };
        let value = token.text(self.text);
        let accepted = self
            .ctx
            .db
            .values_for(token.command_name(), key)
            .is_none_or(|values| values.contains(value));
        if !accepted {
            self.error(SyntaxErrorKind::UnrecognizedKeyValue, token.start, token.length);
        }
    }
}

fn is_display(delimiter: &str) -> u32 {
    if delimiter == "$$" || delimiter == "\\[" {
        format::DISPLAY_MATH
    } else {
        format::INLINE_MATH
    }
}

/// Number of columns declared by a tabular column definition.
pub fn count_columns(definition: &str, db: &CommandDatabase) -> usize {
    let chars: Vec<char> = definition.chars().collect();
    let mut count: usize = 0;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '@' | '!' | '>' | '<' => i = skip_group(&chars, i).1,
            '*' => {
                let (repeat, next) = skip_group(&chars, i);
                let (spec, next) = skip_group(&chars, next);
                i = next;
                let repeat: usize = repeat.trim().parse().unwrap_or(1);
                count = count.saturating_add(repeat.saturating_mul(count_columns(&spec, db)));
            }
            'l' | 'c' | 'r' | 'p' | 'm' | 'b' => {
                count = count.saturating_add(1);
                if matches!(c, 'p' | 'm' | 'b') {
                    i = skip_group(&chars, i).1;
                }
            }
            c if c.is_alphabetic() => {
                count = count.saturating_add(1);
                if db.is_column_type(c) && chars.get(i) == Some(&'{') {
                    i = skip_group(&chars, i).1;
                }
            }
            _ => {}
        }
    }
    count
}

/// Read a `{...}` group starting at `at` (after blanks); returns its content and the next index.
fn skip_group(chars: &[char], at: usize) -> (String, usize) {
    let mut i = at;
    while chars.get(i).is_some_and(|c| c.is_whitespace()) {
        i += 1;
    }
    if chars.get(i) != Some(&'{') {
        return (String::new(), at);
    }
    let mut depth = 0usize;
    let start = i + 1;
    while i < chars.len() {
        match chars[i] {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return (chars[start..i].iter().collect(), i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    (chars[start..].iter().collect(), chars.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex_line;
    use crate::token::TokenStack;

    fn check_lines(lines: &[&str], db: &CommandDatabase) -> (Vec<Vec<SyntaxError>>, StackEnvironment) {
        let mut envs = StackEnvironment::new();
        let mut remainder = TokenStack::new();
        let ctx = LineContext {
            db,
            line: None,
            math_highlight: true,
        };
        let mut out = Vec::new();
        for line in lines {
            let lexed = lex_line(line, &remainder, db);
            out.push(check_line(line, &lexed.tokens, &mut envs, &ctx));
            remainder = lexed.remainder;
        }
        (out, envs)
    }

    fn kinds(errors: &[SyntaxError]) -> Vec<SyntaxErrorKind> {
        errors.iter().filter(|e| e.is_error()).map(|e| e.kind).collect()
    }

    #[test]
    fn test_count_columns() {
        let db = CommandDatabase::builtin();
        assert_eq!(count_columns("ll", &db), 2);
        assert_eq!(count_columns("|l|c|r|", &db), 3);
        assert_eq!(count_columns("p{3cm} @{--} c", &db), 2);
        assert_eq!(count_columns("*{3}{c|}l", &db), 4);
        assert_eq!(count_columns(">{\\bfseries}l<{x}r", &db), 2);
    }

    #[test]
    fn test_count_columns_saturates() {
        let db = CommandDatabase::builtin();
        assert_eq!(count_columns("*{18446744073709551615}{cc}", &db), usize::MAX);
        assert_eq!(
            count_columns("*{4294967296}{*{4294967296}{c}}l", &db),
            usize::MAX
        );
    }

    #[test]
    fn test_huge_multicolumn_span() {
        let db = CommandDatabase::builtin();
        let (errors, envs) = check_lines(
            &["\\begin{tabular}{ll}", "\\multicolumn{2147483647}{c}{x} & y \\\\"],
            &db,
        );
        assert_eq!(kinds(&errors[1]), vec![SyntaxErrorKind::TooManyColumns]);
        assert_eq!(envs.top().excess_col, 0);
    }

    #[test]
    fn test_too_many_columns_extends_to_line_break() {
        let db = CommandDatabase::builtin();
        let text = "a & b & c \\\\";
        let (errors, envs) = check_lines(&["\\begin{tabular}{ll}", text], &db);
        assert!(errors[0].is_empty());
        let too_many: Vec<_> = errors[1]
            .iter()
            .filter(|e| e.kind == SyntaxErrorKind::TooManyColumns)
            .collect();
        assert_eq!(too_many.len(), 1);
        assert_eq!(too_many[0].start, 6);
        assert_eq!(too_many[0].end(), 9);
        assert_eq!(envs.top().excess_col, 0);
    }

    #[test]
    fn test_too_few_columns_and_missing_linebreak() {
        let db = CommandDatabase::builtin();
        let (errors, _) = check_lines(
            &["\\begin{tabular}{lll}", "a & b \\\\", "a & b & c", "\\hline"],
            &db,
        );
        assert_eq!(kinds(&errors[1]), vec![SyntaxErrorKind::TooFewColumns]);
        assert!(errors[2].is_empty());
        assert_eq!(kinds(&errors[3]), vec![SyntaxErrorKind::MissingLinebreak]);
    }

    #[test]
    fn test_multicolumn_counts_its_span() {
        let db = CommandDatabase::builtin();
        let (errors, _) = check_lines(
            &["\\begin{tabular}{lll}", "\\multicolumn{2}{c}{x} & y \\\\", "\\end{tabular}"],
            &db,
        );
        assert!(kinds(&errors[1]).is_empty(), "{:?}", errors[1]);
    }

    #[test]
    fn test_environment_nesting() {
        let db = CommandDatabase::builtin();
        let (errors, envs) = check_lines(
            &["\\begin{itemize}", "\\item x", "\\end{enumerate}", "\\end{itemize}"],
            &db,
        );
        assert!(errors[1].is_empty());
        assert_eq!(kinds(&errors[2]), vec![SyntaxErrorKind::ClosingUnopenedEnvironment]);
        assert!(errors[3].is_empty());
        assert!(envs.is_baseline());
    }

    #[test]
    fn test_unknown_environment_is_still_tracked() {
        let db = CommandDatabase::builtin();
        let (errors, envs) = check_lines(&["\\begin{nosuchenv}"], &db);
        assert_eq!(kinds(&errors[0]), vec![SyntaxErrorKind::UnrecognizedEnvironment]);
        assert_eq!(errors[0][0].start, 7);
        assert_eq!(envs.top().name, "nosuchenv");
    }

    #[test]
    fn test_command_classification() {
        let db = CommandDatabase::builtin();
        let (errors, _) = check_lines(&["\\alpha \\hline \\item \\nosuchcommand"], &db);
        assert_eq!(
            kinds(&errors[0]),
            vec![
                SyntaxErrorKind::MathCommandOutsideMath,
                SyntaxErrorKind::TabularCommandOutsideTabular,
                SyntaxErrorKind::CommandOutsideSuitableEnvironment,
                SyntaxErrorKind::UnrecognizedCommand,
            ]
        );
    }

    #[test]
    fn test_math_delimiters() {
        let db = CommandDatabase::builtin();
        let (errors, envs) = check_lines(&["a $\\alpha$ b \\[ x", "\\beta \\]"], &db);
        assert!(kinds(&errors[0]).is_empty());
        let highlights: Vec<_> = errors[0].iter().filter(|e| !e.is_error()).collect();
        assert_eq!(highlights.len(), 2);
        assert_eq!((highlights[0].start, highlights[0].end()), (2, 10));
        assert_eq!(highlights[0].format, format::INLINE_MATH);
        assert_eq!(highlights[1].start, 13);
        assert_eq!(highlights[1].format, format::DISPLAY_MATH);

        assert!(kinds(&errors[1]).is_empty());
        assert_eq!(errors[1][0].start, 0);
        assert!(envs.is_baseline());

        let (errors, _) = check_lines(&["x \\)"], &db);
        assert_eq!(kinds(&errors[0]), vec![SyntaxErrorKind::ClosingUnopenedEnvironment]);
    }

    #[test]
    fn test_definitions_are_not_checked() {
        let db = CommandDatabase::builtin();
        let (errors, _) = check_lines(&["\\newcommand{\\foo}{\\nosuch \\alpha}"], &db);
        assert!(kinds(&errors[0]).is_empty(), "{:?}", errors[0]);
    }

    #[test]
    fn test_key_values() {
        let mut db = CommandDatabase::builtin();
        db.add_command("\\includegraphics[keyvals]{imagefile}", &[category::NORMAL])
            .unwrap();
        db.add_keys("\\includegraphics", ["width", "angle", "draft"]);
        db.add_key_values("\\includegraphics", "draft", ["true", "false"]);
        let (errors, _) = check_lines(
            &["\\includegraphics[width=3cm, colour=red, draft=maybe]{a.png}"],
            &db,
        );
        assert_eq!(
            kinds(&errors[0]),
            vec![SyntaxErrorKind::UnrecognizedKey, SyntaxErrorKind::UnrecognizedKeyValue]
        );
    }
}
