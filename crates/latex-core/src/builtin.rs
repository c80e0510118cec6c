//! Built-in LaTeX command table.

use crate::database::{CommandDatabase, category};
use tracing::warn;

const DOCUMENT_COMMANDS: &[&str] = &[
    "\\begin{beginenv}",
    "\\end{endenv}",
    "\\title[short title]{text}",
    "\\author{text}",
    "\\date{text}",
    "\\thanks{text}",
    "\\maketitle",
    "\\tableofcontents",
    "\\listoffigures",
    "\\listoftables",
    "\\textbf{text}",
    "\\textit{text}",
    "\\textsl{text}",
    "\\emph{text}",
    "\\texttt{text}",
    "\\textsc{text}",
    "\\textrm{text}",
    "\\textsf{text}",
    "\\textup{text}",
    "\\textmd{text}",
    "\\textnormal{text}",
    "\\underline{text}",
    "\\footnote[number]{text}",
    "\\footnotemark[number]",
    "\\footnotetext[number]{text}",
    "\\marginpar{text}",
    "\\caption[short]{text}",
    "\\index{text}",
    "\\hyphenation{text}",
    "\\mbox{text}",
    "\\fbox{text}",
    "\\makebox[width][pos]{text}",
    "\\framebox[width][pos]{text}",
    "\\parbox[pos]{width}{text}",
    "\\raisebox{length}{text}",
    "\\rule[length]{width}{length}",
    "\\vspace{length}",
    "\\vspace*{length}",
    "\\hspace{length}",
    "\\hspace*{length}",
    "\\setlength{cmd name}{length}",
    "\\addtolength{cmd name}{length}",
    "\\setcounter{counter name}{value}",
    "\\addtocounter{counter name}{value}",
    "\\stepcounter{counter name}",
    "\\refstepcounter{counter name}",
    "\\value{counter name}",
    "\\arabic{counter name}",
    "\\roman{counter name}",
    "\\Roman{counter name}",
    "\\alph{counter name}",
    "\\Alph{counter name}",
    "\\pagestyle{style}",
    "\\thispagestyle{style}",
    "\\pagenumbering{style}",
    "\\addcontentsline{file}{level}{text}",
    "\\bibliographystyle{style}",
    "\\fontsize{size}{skip}",
    "\\ensuremath{formula}",
    "\\includeonly{files}",
    "\\nocite{keys}",
    "\\cite[text]{keys}",
    "\\linebreak[number]",
    "\\pagebreak[number]",
    "\\nolinebreak[number]",
    "\\nopagebreak[number]",
    "\\newline",
    "\\newpage",
    "\\clearpage",
    "\\cleardoublepage",
    "\\noindent",
    "\\indent",
    "\\par",
    "\\centering",
    "\\raggedright",
    "\\raggedleft",
    "\\tiny",
    "\\scriptsize",
    "\\footnotesize",
    "\\small",
    "\\normalsize",
    "\\large",
    "\\Large",
    "\\LARGE",
    "\\huge",
    "\\Huge",
    "\\bfseries",
    "\\mdseries",
    "\\itshape",
    "\\slshape",
    "\\upshape",
    "\\scshape",
    "\\rmfamily",
    "\\sffamily",
    "\\ttfamily",
    "\\normalfont",
    "\\selectfont",
    "\\vfill",
    "\\hfill",
    "\\smallskip",
    "\\medskip",
    "\\bigskip",
    "\\quad",
    "\\qquad",
    "\\today",
    "\\TeX",
    "\\LaTeX",
    "\\ldots",
    "\\dots",
    "\\textwidth",
    "\\textheight",
    "\\linewidth",
    "\\columnwidth",
    "\\paperwidth",
    "\\paperheight",
    "\\baselineskip",
    "\\parindent",
    "\\parskip",
    "\\thepage",
    "\\protect",
    "\\relax",
    "\\the",
    "\\string",
    "\\let",
    "\\global",
    "\\long",
    "\\expandafter",
    "\\csname",
    "\\endcsname",
    "\\if",
    "\\ifx",
    "\\else",
    "\\fi",
    "\\makeatletter",
    "\\makeatother",
    "\\,",
    "\\;",
    "\\:",
    "\\!",
    "\\/",
    "\\@",
    "\\&",
    "\\%",
    "\\$",
    "\\#",
    "\\_",
    "\\{",
    "\\}",
    "\\'",
    "\\`",
    "\\^",
    "\\\"",
    "\\~",
    "\\=",
    "\\.",
    "\\-",
];

const SECTIONING: &[(&str, i32)] = &[
    ("\\part", -2),
    ("\\chapter", -1),
    ("\\section", 0),
    ("\\subsection", 1),
    ("\\subsubsection", 2),
    ("\\paragraph", 3),
    ("\\subparagraph", 4),
];

const SEMANTIC_COMMANDS: &[(&str, &[&str])] = &[
    ("\\documentclass[options]{class}", &[category::DOCUMENTCLASS]),
    ("\\usepackage[options]{packages}", &[category::USEPACKAGE]),
    ("\\RequirePackage[options]{packages}", &[category::USEPACKAGE]),
    ("\\label{label}", &[category::LABEL]),
    ("\\ref{ref}", &[category::REF]),
    ("\\pageref{ref}", &[category::REF]),
    ("\\include{file}", &[category::INCLUDE]),
    ("\\input{file}", &[category::INCLUDE]),
    ("\\bibliography{bibfiles}", &[category::BIBLIOGRAPHY]),
    ("\\appendix", &[category::APPENDIX]),
    ("\\newcommand{cmd}[args][default]{def}", &[category::DEFINITION]),
    ("\\newcommand*{cmd}[args][default]{def}", &[category::DEFINITION]),
    ("\\renewcommand{cmd}[args][default]{def}", &[category::DEFINITION]),
    ("\\renewcommand*{cmd}[args][default]{def}", &[category::DEFINITION]),
    ("\\providecommand{cmd}[args][default]{def}", &[category::DEFINITION]),
    ("\\providecommand*{cmd}[args][default]{def}", &[category::DEFINITION]),
    ("\\DeclareRobustCommand{cmd}[args][default]{def}", &[category::DEFINITION]),
    ("\\def{cmd}{def}", &[category::DEFINITION]),
    ("\\gdef{cmd}{def}", &[category::DEFINITION]),
    ("\\edef{cmd}{def}", &[category::DEFINITION]),
    ("\\xdef{cmd}{def}", &[category::DEFINITION]),
    ("\\newenvironment{envname}[args][default]{begdef}{enddef}", &[category::ENV_DEFINITION]),
    ("\\renewenvironment{envname}[args][default]{begdef}{enddef}", &[category::ENV_DEFINITION]),
    ("\\newtheorem{theorem}[numbered like]{caption}[within]", &[category::THEOREM]),
    ("\\newcounter{name}[within]", &[category::COUNTER]),
    ("\\newif{cmd}", &[category::IF_DEFINITION]),
    ("\\newlength{cmd}", &[category::LENGTH]),
    ("\\newcolumntype{name}[args]{def}", &[category::COLUMN_TYPE]),
    ("\\verb", &[category::VERBATIM]),
    ("\\verb*", &[category::VERBATIM]),
    ("\\\\[length]", &[category::LINEBREAK]),
];

const TABULAR_COMMANDS: &[(&str, &[&str])] = &[
    ("\\hline", &[category::ROW_RULE]),
    ("\\cline{columns}", &[category::ROW_RULE]),
    ("\\multicolumn{n}{cols}{text}", &[category::MULTICOLUMN]),
    ("\\tabularnewline", &[category::LINEBREAK]),
];

const TABBING_COMMANDS: &[&str] = &["\\>", "\\<", "\\+", "\\kill", "\\pushtabs", "\\poptabs"];

const MATH_COMMANDS: &[&str] = &[
    "\\frac{num}{den}",
    "\\sqrt[n]{formula}",
    "\\mathrm{text}",
    "\\mathbf{text}",
    "\\mathit{text}",
    "\\mathsf{text}",
    "\\mathtt{text}",
    "\\mathcal{text}",
    "\\hat{formula}",
    "\\bar{formula}",
    "\\vec{formula}",
    "\\tilde{formula}",
    "\\dot{formula}",
    "\\ddot{formula}",
    "\\overline{formula}",
    "\\underbrace{formula}",
    "\\overbrace{formula}",
    "\\left",
    "\\right",
    "\\middle",
    "\\big",
    "\\Big",
    "\\bigg",
    "\\Bigg",
    "\\displaystyle",
    "\\textstyle",
    "\\scriptstyle",
    "\\limits",
    "\\nolimits",
    "\\sum",
    "\\prod",
    "\\int",
    "\\oint",
    "\\lim",
    "\\sup",
    "\\inf",
    "\\max",
    "\\min",
    "\\sin",
    "\\cos",
    "\\tan",
    "\\log",
    "\\ln",
    "\\exp",
    "\\det",
    "\\cdot",
    "\\cdots",
    "\\vdots",
    "\\ddots",
    "\\times",
    "\\div",
    "\\pm",
    "\\mp",
    "\\leq",
    "\\le",
    "\\geq",
    "\\ge",
    "\\neq",
    "\\ne",
    "\\approx",
    "\\equiv",
    "\\sim",
    "\\simeq",
    "\\propto",
    "\\infty",
    "\\partial",
    "\\nabla",
    "\\forall",
    "\\exists",
    "\\in",
    "\\notin",
    "\\subset",
    "\\subseteq",
    "\\supset",
    "\\cup",
    "\\cap",
    "\\emptyset",
    "\\to",
    "\\rightarrow",
    "\\leftarrow",
    "\\Rightarrow",
    "\\Leftarrow",
    "\\Leftrightarrow",
    "\\mapsto",
    "\\mid",
    "\\prime",
    "\\langle",
    "\\rangle",
    "\\lfloor",
    "\\rfloor",
    "\\lceil",
    "\\rceil",
    "\\alpha",
    "\\beta",
    "\\gamma",
    "\\delta",
    "\\epsilon",
    "\\varepsilon",
    "\\zeta",
    "\\eta",
    "\\theta",
    "\\vartheta",
    "\\iota",
    "\\kappa",
    "\\lambda",
    "\\mu",
    "\\nu",
    "\\xi",
    "\\pi",
    "\\rho",
    "\\sigma",
    "\\tau",
    "\\upsilon",
    "\\phi",
    "\\varphi",
    "\\chi",
    "\\psi",
    "\\omega",
    "\\Gamma",
    "\\Delta",
    "\\Theta",
    "\\Lambda",
    "\\Xi",
    "\\Pi",
    "\\Sigma",
    "\\Phi",
    "\\Psi",
    "\\Omega",
];

const ENVIRONMENTS: &[(&str, &[&str])] = &[
    ("document", &[]),
    ("itemize", &[]),
    ("enumerate", &["itemize"]),
    ("description", &["itemize"]),
    ("list", &["itemize"]),
    ("center", &[]),
    ("flushleft", &[]),
    ("flushright", &[]),
    ("quote", &[]),
    ("quotation", &[]),
    ("verse", &[]),
    ("abstract", &[]),
    ("titlepage", &[]),
    ("figure", &[]),
    ("figure*", &[]),
    ("table", &[]),
    ("table*", &[]),
    ("minipage", &[]),
    ("picture", &[]),
    ("tabular", &[category::TABULAR]),
    ("tabular*", &[category::TABULAR]),
    ("array", &[category::MATH, category::TABULAR]),
    ("tabbing", &[category::TABBING]),
    ("math", &[category::MATH]),
    ("displaymath", &[category::MATH]),
    ("equation", &[category::MATH]),
    ("eqnarray", &[category::MATH, category::TABULAR]),
    ("eqnarray*", &[category::MATH, category::TABULAR]),
    ("thebibliography", &[]),
    ("verbatim", &[]),
    ("verbatim*", &[]),
    ("filecontents", &[]),
];

const ENVIRONMENT_SIGNATURES: &[&str] = &[
    "\\begin{tabular}[pos]{cols}",
    "\\begin{tabular*}{width}[pos]{cols}",
    "\\begin{array}[pos]{cols}",
    "\\begin{minipage}[pos]{width}",
    "\\begin{figure}[placement]",
    "\\begin{figure*}[placement]",
    "\\begin{table}[placement]",
    "\\begin{table*}[placement]",
    "\\begin{thebibliography}{widest label}",
    "\\begin{list}{label}{spacing}",
    "\\begin{filecontents}{file}",
];

const RESTRICTED_COMMANDS: &[(&str, &str)] = &[
    ("\\item[text]", "itemize"),
    ("\\bibitem[text]{bibid}", "thebibliography"),
];

const VERBATIM_ENVIRONMENTS: &[&str] = &["verbatim", "verbatim*", "filecontents"];

const MATH_DELIMITERS: &[(&str, &str)] = &[("$", "$"), ("$$", "$$"), ("\\(", "\\)"), ("\\[", "\\]")];

fn add_all(db: &mut CommandDatabase, signatures: &[&str], categories: &[&str]) {
    for signature in signatures {
        if let Err(err) = db.add_command(signature, categories) {
            warn!(%err, "skipping built-in command");
        }
    }
}

/// The LaTeX kernel table used as the base of every document database.
pub(crate) fn latex_document() -> CommandDatabase {
    let mut db = CommandDatabase::new();

    add_all(&mut db, DOCUMENT_COMMANDS, &[category::NORMAL]);
    add_all(&mut db, MATH_COMMANDS, &[category::MATH]);
    add_all(&mut db, TABBING_COMMANDS, &[category::TABBING]);

    for (signature, roles) in SEMANTIC_COMMANDS {
        let mut cats = vec![category::NORMAL];
        cats.extend_from_slice(roles);
        add_all(&mut db, &[signature], &cats);
    }
    for (signature, roles) in TABULAR_COMMANDS {
        let mut cats = vec![category::TABULAR];
        cats.extend_from_slice(roles);
        add_all(&mut db, &[signature], &cats);
    }
    for (signature, env) in RESTRICTED_COMMANDS {
        add_all(&mut db, &[signature], &[env]);
    }
    db.add_to_category(category::BIBITEM, "\\bibitem");

    for (name, level) in SECTIONING {
        let signature = format!("{name}[short title]{{title}}");
        let starred = format!("{name}*{{title}}");
        add_all(&mut db, &[&signature, &starred], &[category::NORMAL]);
        db.set_structure_level(name, *level);
        db.set_structure_level(&format!("{name}*"), *level);
    }

    for (env, aliases) in ENVIRONMENTS {
        db.add_environment(env, aliases.iter().copied());
    }
    add_all(&mut db, ENVIRONMENT_SIGNATURES, &[]);
    for env in VERBATIM_ENVIRONMENTS {
        db.add_to_category(category::VERBATIM_ENV, env);
    }

    for (open, close) in MATH_DELIMITERS {
        db.add_math_delimiter(open, close);
    }

    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sectioning_levels() {
        let db = latex_document();
        assert_eq!(db.structure_level("\\part"), Some(-2));
        assert_eq!(db.structure_level("\\section"), Some(0));
        assert_eq!(db.structure_level("\\section*"), Some(0));
        assert_eq!(db.structure_level("\\subparagraph"), Some(4));
        assert_eq!(db.structure_level("\\textbf"), None);
    }

    #[test]
    fn test_builtin_categories() {
        let db = latex_document();
        assert!(db.in_category(category::NORMAL, "\\section"));
        assert!(db.in_category(category::MATH, "\\frac"));
        assert!(db.in_category(category::TABULAR, "\\hline"));
        assert!(db.in_category(category::ROW_RULE, "\\hline"));
        assert!(db.in_category("itemize", "\\item"));
        assert!(db.in_category(category::BIBITEM, "\\bibitem"));
        assert!(db.in_category(category::VERBATIM_ENV, "verbatim"));
        assert!(db.environment_is("equation", category::MATH));
        assert!(db.environment_is("enumerate", "itemize"));
        assert_eq!(db.math_close_for("\\("), Some("\\)"));
    }
}
