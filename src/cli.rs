use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::config::Config;
use crate::orchestrator::ResumeMode;

/// 使用大模型批量判断论文与调研主题的相关性
#[derive(Parser, Debug)]
#[command(name = "survey-relevance", version)]
#[command(group(ArgGroup::new("resume_mode").args(["resume", "fresh"])))]
pub struct Cli {
    /// 调研主题（也可通过 SURVEY_TOPIC 设置）
    #[arg(long)]
    pub survey_topic: Option<String>,

    /// 调研范围的详细描述
    #[arg(long)]
    pub survey_description: Option<String>,

    /// TOML 配置文件
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 论文 JSON 文件所在目录
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// 结果 CSV 文件
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// 每批论文数量
    #[arg(long)]
    pub batch: Option<usize>,

    /// 检查点文件
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// 不在每批完成后保存检查点
    #[arg(long, default_value_t = false)]
    pub no_save_every_batch: bool,

    /// 模型名称
    #[arg(long)]
    pub model: Option<String>,

    /// 推理服务地址（OpenAI 兼容）
    #[arg(long)]
    pub api_base: Option<String>,

    /// 每篇论文的最大尝试次数
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// 两次尝试之间的等待秒数
    #[arg(long)]
    pub retry_delay: Option<f64>,

    /// 同时进行的推理请求上限
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    #[arg(long)]
    pub log_level: Option<String>,

    /// 额外写入 DEBUG 级别日志的文件
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// 年份范围（闭区间）
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    pub filter_years: Option<Vec<i32>>,

    /// 只处理这些会议（大小写不敏感）
    #[arg(long, num_args = 1..)]
    pub filter_conferences: Vec<String>,

    /// 标题或摘要包含任一关键词
    #[arg(long, num_args = 1..)]
    pub filter_keywords: Vec<String>,

    /// 只展示语料概要，不调用模型
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// 为每个评级单独导出 CSV
    #[arg(long, default_value_t = false)]
    pub create_separate_csvs: bool,

    /// 存在检查点时直接恢复
    #[arg(long, default_value_t = false)]
    pub resume: bool,

    /// 忽略已有检查点，重新开始
    #[arg(long, default_value_t = false)]
    pub fresh: bool,
}

impl Cli {
    pub fn resume_mode(&self) -> ResumeMode {
        if self.resume {
            ResumeMode::Resume
        } else if self.fresh {
            ResumeMode::Fresh
        } else {
            ResumeMode::Ask
        }
    }

    /// 用命令行参数覆盖配置（最高优先级）
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(v) = &self.survey_topic {
            config.survey.topic = v.clone();
        }
        if let Some(v) = &self.survey_description {
            config.survey.description = v.clone();
        }
        if let Some(v) = &self.input {
            config.processing.input_dir = v.clone();
        }
        if let Some(v) = &self.output {
            config.processing.output_file = v.clone();
        }
        if let Some(v) = self.batch {
            config.processing.batch_size = v;
        }
        if let Some(v) = &self.checkpoint {
            config.processing.checkpoint_file = v.clone();
        }
        if self.no_save_every_batch {
            config.processing.save_every_batch = false;
        }
        if let Some(v) = self.max_concurrent {
            config.processing.max_concurrent_requests = v;
        }
        if let Some(v) = &self.model {
            config.llm.model_name = v.clone();
        }
        if let Some(v) = &self.api_base {
            config.llm.api_base_url = v.clone();
        }
        if let Some(v) = self.max_retries {
            config.llm.max_retries = v;
        }
        if let Some(v) = self.retry_delay {
            config.llm.retry_delay = v;
        }
        if let Some(v) = &self.log_level {
            config.logging.log_level = v.clone();
        }
        if let Some(v) = &self.log_file {
            config.logging.log_file = Some(v.clone());
        }
        if self.verbose {
            config.logging.verbose = true;
        }
        if let Some([start, end]) = self.filter_years.as_deref() {
            config.filter.years = Some((*start, *end));
        }
        if !self.filter_conferences.is_empty() {
            config.filter.conferences = self.filter_conferences.clone();
        }
        if !self.filter_keywords.is_empty() {
            config.filter.keywords = self.filter_keywords.clone();
        }
        if self.dry_run {
            config.app.dry_run = true;
        }
        if self.create_separate_csvs {
            config.app.create_separate_csvs = true;
        }
        config
    }
}
