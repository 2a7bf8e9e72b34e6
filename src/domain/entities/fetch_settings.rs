use serde::{Deserialize, Serialize};

use crate::domain::value_objects::ref_spec::RefSpec;

/// fetchで取得するrefの範囲
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// 指定したrefspecのみ
    #[default]
    RefSpecs,

    /// すべてのref
    AllRefs,

    /// タグ以外のすべてのref
    AllRefsExceptTags,
}

impl FetchMode {
    pub fn for_fetch_all(include_tags: bool) -> Self {
        if include_tags {
            Self::AllRefs
        } else {
            Self::AllRefsExceptTags
        }
    }
}

/// 1回のfetchの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSettings {
    pub mode: FetchMode,

    /// `RefSpecs` モードで使うrefspec
    #[serde(default)]
    pub ref_specs: Vec<RefSpec>,

    /// 浅いfetchの深さ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,

    /// タグを自動で取得するか
    #[serde(default = "default_true")]
    pub fetch_tags: bool,

    /// 進捗を出力するか
    #[serde(default)]
    pub show_progress: bool,
}

fn default_true() -> bool {
    true
}

impl FetchSettings {
    pub fn new(ref_specs: Vec<RefSpec>) -> Self {
        Self {
            mode: FetchMode::RefSpecs,
            ref_specs,
            depth: None,
            fetch_tags: true,
            show_progress: false,
        }
    }

    pub fn all_refs(include_tags: bool) -> Self {
        Self {
            mode: FetchMode::for_fetch_all(include_tags),
            ref_specs: Vec::new(),
            depth: None,
            fetch_tags: include_tags,
            show_progress: false,
        }
    }

    pub fn with_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_depth(mut self, depth: Option<u32>) -> Self {
        self.depth = depth.filter(|d| *d > 0);
        self
    }

    pub fn with_fetch_tags(mut self, fetch_tags: bool) -> Self {
        self.fetch_tags = fetch_tags;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// 実際にfetchへ渡すrefspecを返す
    ///
    /// 否定refspecを使えないバックエンドでは、タグ除外の代わりにブランチのみを取得する。
    pub fn effective_ref_specs(&self, negative_refspecs_supported: bool) -> Vec<RefSpec> {
        match self.mode {
            FetchMode::RefSpecs => {
                let mut specs: Vec<RefSpec> = Vec::with_capacity(self.ref_specs.len());
                for spec in &self.ref_specs {
                    if !specs.contains(spec) {
                        specs.push(spec.clone());
                    }
                }
                specs
            }
            FetchMode::AllRefs => vec![RefSpec::all_refs()],
            FetchMode::AllRefsExceptTags if negative_refspecs_supported => {
                vec![RefSpec::all_refs(), RefSpec::exclude_tags()]
            }
            FetchMode::AllRefsExceptTags => vec![RefSpec::all_branches()],
        }
    }

    pub fn is_fetch_all(&self) -> bool {
        self.mode != FetchMode::RefSpecs
    }
}
