/// One unit of background upload work (spec §4.8, §6 backend object names).
#[derive(Clone, Debug)]
pub enum TaskKind {
    /// `<sconumber>_<cloneid>` object (spec §6).
    UploadSco { name: String, data: Vec<u8> },
    /// `tlog_<uuid>` object. May only run after every name in
    /// `depends_on_scos` has uploaded successfully in this namespace (spec
    /// §4.8: "a TLog may upload only after all SCOs it references are
    /// uploaded").
    UploadTlog {
        name: String,
        data: Vec<u8>,
        depends_on_scos: Vec<String>,
    },
    /// `snapshots.xml`-equivalent publish. May only run after
    /// `depends_on_tlog` has uploaded (spec §4.8: "a snapshot-file publish
    /// only after its terminal TLog").
    PublishSnapshotFile { name: String, data: Vec<u8>, depends_on_tlog: String },
    /// A standalone checksum object write with no dependency.
    WriteChecksum { name: String, data: Vec<u8> },
}

impl TaskKind {
    pub fn object_name(&self) -> &str {
        match self {
            TaskKind::UploadSco { name, .. } => name,
            TaskKind::UploadTlog { name, .. } => name,
            TaskKind::PublishSnapshotFile { name, .. } => name,
            TaskKind::WriteChecksum { name, .. } => name,
        }
    }

    fn depends_on(&self) -> &[String] {
        match self {
            TaskKind::UploadTlog { depends_on_scos, .. } => depends_on_scos,
            TaskKind::PublishSnapshotFile { depends_on_tlog, .. } => std::slice::from_ref(depends_on_tlog),
            TaskKind::UploadSco { .. } | TaskKind::WriteChecksum { .. } => &[],
        }
    }

    pub(crate) fn data(&self) -> &[u8] {
        match self {
            TaskKind::UploadSco { data, .. }
            | TaskKind::UploadTlog { data, .. }
            | TaskKind::PublishSnapshotFile { data, .. }
            | TaskKind::WriteChecksum { data, .. } => data,
        }
    }
}

/// One queued task, tagged with the namespace-local sequence number it was
/// submitted at (used by [`crate::BackendTaskRunner::barrier`]).
#[derive(Clone, Debug)]
pub struct Task {
    pub seq: u64,
    pub namespace: String,
    pub kind: TaskKind,
}

impl Task {
    /// Whether every object this task depends on has already uploaded
    /// successfully in `completed`.
    pub(crate) fn is_ready(&self, completed: &std::collections::HashSet<String>) -> bool {
        self.kind.depends_on().iter().all(|dep| completed.contains(dep))
    }
}
