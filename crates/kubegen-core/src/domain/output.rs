//! Output assembly: typed files with stable identities and deferred
//! cross-file templates.
//!
//! Files are accumulated first and placed later. A script line can name a
//! file by identity (`${FILE_3}`) before anybody knows where file 3 will be
//! written; the placeholder is rendered only once every file has a location.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::object::StructuralObject;
use crate::domain::value_objects::{FileId, FileKind, Location};

/// Identity → chosen location, filled during materialization.
pub type LocationMap = BTreeMap<FileId, Location>;

/// Header written at the top of every script file.
pub const SCRIPT_HEADER: &str = "#!/bin/bash";

const PLACEHOLDER_OPEN: &str = "${FILE_";

// ── Deferred templates ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Text(String),
    File(FileId),
}

/// A script line with `${FILE_<id>}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTemplate {
    parts: Vec<TemplatePart>,
}

impl FileTemplate {
    pub fn parse(template: &str) -> DomainResult<Self> {
        let invalid = |reason: &str| DomainError::InvalidTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = Vec::new();
        let mut rest = template;
        while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
            if start > 0 {
                parts.push(TemplatePart::Text(rest[..start].to_string()));
            }
            let after = &rest[start + PLACEHOLDER_OPEN.len()..];
            let end = after.find('}').ok_or_else(|| invalid("unterminated placeholder"))?;
            let raw = after[..end]
                .parse::<u32>()
                .map_err(|_| invalid("placeholder must be ${FILE_<number>}"))?;
            parts.push(TemplatePart::File(FileId::new(raw)));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            parts.push(TemplatePart::Text(rest.to_string()));
        }

        Ok(Self { parts })
    }

    /// The placeholder text for `id`, for use in `format!`.
    pub fn placeholder(id: FileId) -> String {
        format!("{PLACEHOLDER_OPEN}{id}}}")
    }

    /// File identities this template embeds.
    pub fn references(&self) -> impl Iterator<Item = FileId> + '_ {
        self.parts.iter().filter_map(|part| match part {
            TemplatePart::File(id) => Some(*id),
            TemplatePart::Text(_) => None,
        })
    }

    /// Substitute every placeholder; `owner` is the file holding the line.
    pub fn render(&self, owner: FileId, locations: &LocationMap) -> DomainResult<String> {
        self.parts
            .iter()
            .map(|part| match part {
                TemplatePart::Text(text) => Ok(text.clone()),
                TemplatePart::File(id) => locations
                    .get(id)
                    .map(|location| location.to_string())
                    .ok_or(DomainError::DanglingReference {
                        file: owner,
                        referenced: *id,
                    }),
            })
            .collect()
    }
}

impl fmt::Display for FileTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                TemplatePart::Text(text) => f.write_str(text)?,
                TemplatePart::File(id) => f.write_str(&Self::placeholder(*id))?,
            }
        }
        Ok(())
    }
}

// ── Files ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptLine {
    Literal(String),
    Template(FileTemplate),
}

/// Structural objects serialized as one multi-document file.
///
/// Appended objects can be read but not changed.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFile {
    name: String,
    objects: Vec<StructuralObject>,
}

impl DocumentFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn append(&mut self, object: StructuralObject) -> &mut Self {
        self.objects.push(object);
        self
    }

    pub fn extend(&mut self, objects: impl IntoIterator<Item = StructuralObject>) -> &mut Self {
        self.objects.extend(objects);
        self
    }

    pub fn objects(&self) -> &[StructuralObject] {
        &self.objects
    }
}

/// Shell script lines, some of them deferred templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    name: String,
    lines: Vec<ScriptLine>,
}

impl ScriptFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn append_line(&mut self, line: impl Into<String>) -> &mut Self {
        self.lines.push(ScriptLine::Literal(line.into()));
        self
    }

    pub fn append_template(&mut self, template: FileTemplate) -> &mut Self {
        self.lines.push(ScriptLine::Template(template));
        self
    }

    /// Parse `template` and append it.
    pub fn append_template_str(&mut self, template: &str) -> DomainResult<&mut Self> {
        Ok(self.append_template(FileTemplate::parse(template)?))
    }

    pub fn lines(&self) -> &[ScriptLine] {
        &self.lines
    }

    pub fn references(&self) -> BTreeSet<FileId> {
        self.lines
            .iter()
            .flat_map(|line| match line {
                ScriptLine::Template(t) => t.references().collect::<Vec<_>>(),
                ScriptLine::Literal(_) => Vec::new(),
            })
            .collect()
    }

    /// Header plus every line, templates resolved against `locations`.
    pub fn render(&self, owner: FileId, locations: &LocationMap) -> DomainResult<String> {
        let mut out = String::from(SCRIPT_HEADER);
        out.push('\n');
        for line in &self.lines {
            match line {
                ScriptLine::Literal(text) => out.push_str(text),
                ScriptLine::Template(template) => {
                    out.push_str(&template.render(owner, locations)?)
                }
            }
            out.push('\n');
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputFile {
    Documents(DocumentFile),
    Script(ScriptFile),
}

impl OutputFile {
    pub fn kind(&self) -> FileKind {
        match self {
            Self::Documents(_) => FileKind::Documents,
            Self::Script(_) => FileKind::Script,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Documents(file) => file.name(),
            Self::Script(file) => file.name(),
        }
    }
}

impl From<DocumentFile> for OutputFile {
    fn from(file: DocumentFile) -> Self {
        Self::Documents(file)
    }
}

impl From<ScriptFile> for OutputFile {
    fn from(file: ScriptFile) -> Self {
        Self::Script(file)
    }
}

// ── Project ──────────────────────────────────────────────────────────────────

/// Ordered output files with stable identities.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputProject {
    files: Vec<(FileId, OutputFile)>,
    next_id: u32,
    strict_references: bool,
}

impl Default for OutputProject {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputProject {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            next_id: 1,
            strict_references: false,
        }
    }

    /// Only allow templates that reference files appended before (or as)
    /// the script holding them.
    pub fn strict_references(mut self, strict: bool) -> Self {
        self.strict_references = strict;
        self
    }

    /// Append `file` and return its identity.
    pub fn append(&mut self, file: impl Into<OutputFile>) -> FileId {
        let id = FileId::new(self.next_id);
        self.next_id += 1;
        self.files.push((id, file.into()));
        id
    }

    pub fn file(&self, id: FileId) -> DomainResult<&OutputFile> {
        self.files
            .iter()
            .find(|(fid, _)| *fid == id)
            .map(|(_, file)| file)
            .ok_or(DomainError::UnknownFile { id })
    }

    pub fn documents_mut(&mut self, id: FileId) -> DomainResult<&mut DocumentFile> {
        match self.file_mut(id)? {
            OutputFile::Documents(file) => Ok(file),
            OutputFile::Script(_) => Err(DomainError::FileKindMismatch {
                id,
                expected: FileKind::Documents.as_str(),
            }),
        }
    }

    pub fn script_mut(&mut self, id: FileId) -> DomainResult<&mut ScriptFile> {
        match self.file_mut(id)? {
            OutputFile::Script(file) => Ok(file),
            OutputFile::Documents(_) => Err(DomainError::FileKindMismatch {
                id,
                expected: FileKind::Script.as_str(),
            }),
        }
    }

    /// Files in append order.
    pub fn files(&self) -> impl Iterator<Item = (FileId, &OutputFile)> {
        self.files.iter().map(|(id, file)| (*id, file))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every template must reference an appended file; in strict mode,
    /// one appended no later than the script itself.
    pub fn validate_references(&self) -> DomainResult<()> {
        for (id, file) in self.files() {
            let OutputFile::Script(script) = file else {
                continue;
            };
            for referenced in script.references() {
                if self.file(referenced).is_err() {
                    return Err(DomainError::DanglingReference {
                        file: id,
                        referenced,
                    });
                }
                if self.strict_references && referenced > id {
                    return Err(DomainError::ForwardReference {
                        file: id,
                        referenced,
                    });
                }
            }
        }
        Ok(())
    }

    fn file_mut(&mut self, id: FileId) -> DomainResult<&mut OutputFile> {
        self.files
            .iter_mut()
            .find(|(fid, _)| *fid == id)
            .map(|(_, file)| file)
            .ok_or(DomainError::UnknownFile { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identities_increase_across_kinds() {
        let mut project = OutputProject::new();
        let a = project.append(DocumentFile::new("a.yaml"));
        let b = project.append(ScriptFile::new("b.sh"));
        let c = project.append(DocumentFile::new("c.yaml"));

        assert_eq!((a.get(), b.get(), c.get()), (1, 2, 3));
        assert_eq!(project.len(), 3);
        assert_eq!(project.file(b).unwrap().kind(), FileKind::Script);
    }

    #[test]
    fn template_parses_and_renders_placeholders() {
        let t = FileTemplate::parse("kubectl apply -f ${FILE_2} && cat ${FILE_10}").unwrap();
        assert_eq!(
            t.references().map(|id| id.get()).collect::<Vec<_>>(),
            vec![2, 10]
        );

        let locations: LocationMap = [
            (FileId::new(2), Location::from("out/a.yaml")),
            (FileId::new(10), Location::from("out/b.yaml")),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            t.render(FileId::new(1), &locations).unwrap(),
            "kubectl apply -f out/a.yaml && cat out/b.yaml"
        );
        assert_eq!(t.to_string(), "kubectl apply -f ${FILE_2} && cat ${FILE_10}");
    }

    #[test]
    fn malformed_placeholders_are_rejected() {
        assert!(FileTemplate::parse("apply ${FILE_x}").is_err());
        assert!(FileTemplate::parse("apply ${FILE_3").is_err());
        assert!(FileTemplate::parse("no placeholders here").is_ok());
    }

    #[test]
    fn forward_references_are_legal_by_default() {
        let mut project = OutputProject::new();
        let script = project.append(ScriptFile::new("create.sh"));
        project
            .script_mut(script)
            .unwrap()
            .append_template_str("kubectl apply -f ${FILE_5}")
            .unwrap();

        assert!(matches!(
            project.validate_references(),
            Err(DomainError::DanglingReference { .. })
        ));

        for name in ["1.yaml", "2.yaml", "3.yaml", "4.yaml"] {
            project.append(DocumentFile::new(name));
        }

        project.validate_references().unwrap();
        assert!(project.clone().strict_references(true).validate_references().is_err());
    }

    #[test]
    fn strict_mode_allows_backward_references() {
        let mut project = OutputProject::new().strict_references(true);
        let doc = project.append(DocumentFile::new("ns.yaml"));
        let script = project.append(ScriptFile::new("create.sh"));
        project
            .script_mut(script)
            .unwrap()
            .append_template(FileTemplate::parse(&format!("kubectl apply -f {}", FileTemplate::placeholder(doc))).unwrap());

        project.validate_references().unwrap();
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let mut project = OutputProject::new();
        let doc = project.append(DocumentFile::new("ns.yaml"));
        assert_eq!(
            project.script_mut(doc).unwrap_err(),
            DomainError::FileKindMismatch {
                id: doc,
                expected: "script",
            }
        );
        assert!(project.documents_mut(FileId::new(9)).is_err());
    }

    #[test]
    fn script_render_adds_header() {
        let mut script = ScriptFile::new("create.sh");
        script.append_line("set -e");
        script.append_template_str("kubectl apply -f ${FILE_1}").unwrap();

        let locations: LocationMap = [(FileId::new(1), Location::from("ns.yaml"))].into_iter().collect();
        assert_eq!(
            script.render(FileId::new(2), &locations).unwrap(),
            "#!/bin/bash\nset -e\nkubectl apply -f ns.yaml\n"
        );
    }

    #[test]
    fn documents_accumulate_in_order() {
        let mut file = DocumentFile::new("ns.yaml");
        file.append(StructuralObject::new(json!({"kind": "Namespace"})))
            .extend([StructuralObject::new(json!({"kind": "Service"}))]);

        let kinds: Vec<_> = file.objects().iter().filter_map(StructuralObject::kind).collect();
        assert_eq!(kinds, vec!["Namespace", "Service"]);
    }
}
