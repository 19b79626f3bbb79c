//! Prompt rendering for the decision dashboard.

use analysis_core::AnalysisContext;

/// Renders the system instruction and the per-instrument user prompt
pub trait PromptFormatter: Send + Sync {
    fn system_prompt(&self) -> &str;

    /// `name` is the already resolved display name
    fn format(&self, ctx: &AnalysisContext, name: &str) -> String;
}

const DASHBOARD_SYSTEM_PROMPT: &str = r#"你是一位专注于趋势交易的 A 股投资分析师，负责输出【决策仪表盘】。

## 交易纪律
1. 不追高：股价偏离 MA5 超过 5% 时不买入，直接判定为观望。乖离率 = (现价 - MA5) / MA5 × 100%。
2. 顺势：只做 MA5 > MA10 > MA20 多头排列的股票，空头排列不碰。
3. 筹码：90% 集中度 < 15% 视为集中；获利盘 70-90% 时警惕回吐。
4. 买点：缩量回踩 MA5 最佳，回踩 MA10 次之，跌破 MA20 观望。
5. 风险排查：减持、业绩预亏、监管处罚、行业利空、大额解禁。

## 输出格式
只输出一个 JSON 对象，字段如下：

```json
{
    "stock_name": "股票中文名称",
    "sentiment_score": 0-100整数,
    "trend_prediction": "强烈看多/看多/震荡/看空/强烈看空",
    "operation_advice": "买入/加仓/持有/减仓/卖出/观望",
    "decision_type": "buy/hold/sell",
    "confidence_level": "高/中/低",
    "dashboard": {
        "core_conclusion": {
            "one_sentence": "30字以内的核心结论",
            "signal_type": "🟢买入信号/🟡持有观望/🔴卖出信号/⚠️风险警告",
            "time_sensitivity": "立即行动/今日内/本周内/不急",
            "position_advice": {"no_position": "空仓者操作", "has_position": "持仓者操作"}
        },
        "data_perspective": {
            "trend_status": {"ma_alignment": "均线排列", "is_bullish": true, "trend_score": 0-100},
            "price_position": {"current_price": 0, "ma5": 0, "ma10": 0, "ma20": 0, "bias_ma5": 0,
                               "bias_status": "安全/警戒/危险", "support_level": 0, "resistance_level": 0},
            "volume_analysis": {"volume_ratio": 0, "volume_status": "放量/缩量/平量", "turnover_rate": 0,
                                "volume_meaning": "量能解读"},
            "chip_structure": {"profit_ratio": 0, "avg_cost": 0, "concentration": 0, "chip_health": "健康/一般/警惕"}
        },
        "intelligence": {
            "latest_news": "近期重要新闻",
            "risk_alerts": ["风险点"],
            "positive_catalysts": ["利好"],
            "earnings_outlook": "业绩预期",
            "sentiment_summary": "舆情一句话总结"
        },
        "battle_plan": {
            "sniper_points": {"ideal_buy": "理想买入点", "secondary_buy": "次优买入点",
                              "stop_loss": "止损位", "take_profit": "目标位"},
            "position_strategy": {"suggested_position": "建议仓位", "entry_plan": "建仓策略", "risk_control": "风控"},
            "action_checklist": ["✅/⚠️/❌ 检查项"]
        }
    },
    "analysis_summary": "100字综合摘要",
    "key_points": "3-5个核心看点",
    "risk_warning": "风险提示",
    "buy_reason": "操作理由",
    "trend_analysis": "走势形态",
    "short_term_outlook": "1-3日展望",
    "medium_term_outlook": "1-2周展望",
    "technical_analysis": "技术面",
    "ma_analysis": "均线系统",
    "volume_analysis": "量能",
    "pattern_analysis": "K线形态",
    "fundamental_analysis": "基本面",
    "sector_position": "板块行业",
    "company_highlights": "公司亮点/风险",
    "news_summary": "新闻摘要",
    "market_sentiment": "市场情绪",
    "hot_topics": "相关热点",
    "search_performed": true,
    "data_sources": "数据来源"
}
```

## 评分
- 80-100：多头排列、乖离率 < 2%、量能配合、筹码健康、消息面利好
- 60-79：多头或弱多头、乖离率 < 5%、量能正常
- 40-59：均线缠绕或乖离率 > 5%，观望
- 0-39：空头排列、跌破 MA20、重大利空

不要编造数据；数据缺失时直接说明。"#;

/// Default formatter producing the dashboard request
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardPromptFormatter;

fn opt_num(v: Option<f64>) -> String {
    v.map(|x| format!("{}", x)).unwrap_or_else(|| "N/A".to_string())
}

fn opt_text(v: Option<&str>, default: &str) -> String {
    v.filter(|s| !s.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Share volume in 亿股/万股/股
pub fn format_volume(volume: Option<f64>) -> String {
    scaled(volume, "股")
}

/// Money amount in 亿元/万元/元
pub fn format_amount(amount: Option<f64>) -> String {
    scaled(amount, "元")
}

fn scaled(value: Option<f64>, unit: &str) -> String {
    match value {
        None => "N/A".to_string(),
        Some(v) if v >= 1e8 => format!("{:.2} 亿{}", v / 1e8, unit),
        Some(v) if v >= 1e4 => format!("{:.2} 万{}", v / 1e4, unit),
        Some(v) => format!("{:.0} {}", v, unit),
    }
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        "- 无".to_string()
    } else {
        items
            .iter()
            .map(|r| format!("- {}", r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl PromptFormatter for DashboardPromptFormatter {
    fn system_prompt(&self) -> &str {
        DASHBOARD_SYSTEM_PROMPT
    }

    fn format(&self, ctx: &AnalysisContext, name: &str) -> String {
        let code = &ctx.code;
        let today = ctx.today.clone().unwrap_or_default();
        let mut prompt = String::with_capacity(4096);

        prompt.push_str(&format!(
            "# 决策仪表盘分析请求\n\n\
             ## 📊 股票基础信息\n\
             | 项目 | 数据 |\n|------|------|\n\
             | 股票代码 | **{}** |\n| 股票名称 | **{}** |\n| 分析日期 | {} |\n\n---\n\n",
            code,
            name,
            opt_text(ctx.date.as_deref(), "未知"),
        ));

        prompt.push_str(&format!(
            "## 📈 技术面数据\n\n### 今日行情\n\
             | 指标 | 数值 |\n|------|------|\n\
             | 收盘价 | {} 元 |\n| 开盘价 | {} 元 |\n| 最高价 | {} 元 |\n| 最低价 | {} 元 |\n\
             | 涨跌幅 | {}% |\n| 成交量 | {} |\n| 成交额 | {} |\n\n",
            opt_num(today.close),
            opt_num(today.open),
            opt_num(today.high),
            opt_num(today.low),
            opt_num(today.pct_chg),
            format_volume(today.volume),
            format_amount(today.amount),
        ));

        prompt.push_str(&format!(
            "### 均线系统\n| 均线 | 数值 | 说明 |\n|------|------|------|\n\
             | MA5 | {} | 短期趋势线 |\n| MA10 | {} | 中短期趋势线 |\n| MA20 | {} | 中期趋势线 |\n\
             | 均线形态 | {} | 多头/空头/缠绕 |\n",
            opt_num(today.ma5),
            opt_num(today.ma10),
            opt_num(today.ma20),
            opt_text(ctx.ma_status.as_deref(), "未知"),
        ));

        if let Some(rt) = &ctx.realtime {
            prompt.push_str(&format!(
                "\n### 实时行情\n| 指标 | 数值 | 解读 |\n|------|------|------|\n\
                 | 当前价格 | {} 元 | |\n| **量比** | **{}** | {} |\n| **换手率** | **{}%** | |\n\
                 | 市盈率(动态) | {} | |\n| 市净率 | {} | |\n| 总市值 | {} | |\n| 流通市值 | {} | |\n\
                 | 60日涨跌幅 | {}% | 中期表现 |\n",
                opt_num(rt.price),
                opt_num(rt.volume_ratio),
                opt_text(rt.volume_ratio_desc.as_deref(), ""),
                opt_num(rt.turnover_rate),
                opt_num(rt.pe_ratio),
                opt_num(rt.pb_ratio),
                format_amount(rt.total_mv),
                format_amount(rt.circ_mv),
                opt_num(rt.change_60d),
            ));
        }

        if let Some(chip) = &ctx.chip {
            prompt.push_str(&format!(
                "\n### 筹码分布\n| 指标 | 数值 | 健康标准 |\n|------|------|----------|\n\
                 | **获利比例** | **{:.1}%** | 70-90%时警惕 |\n| 平均成本 | {} 元 | 现价应高于5-15% |\n\
                 | 90%筹码集中度 | {:.2}% | <15%为集中 |\n| 70%筹码集中度 | {:.2}% | |\n| 筹码状态 | {} | |\n",
                chip.profit_ratio * 100.0,
                opt_num(chip.avg_cost),
                chip.concentration_90 * 100.0,
                chip.concentration_70 * 100.0,
                opt_text(chip.chip_status.as_deref(), "未知"),
            ));
        }

        if let Some(trend) = &ctx.trend_analysis {
            let bias_warning = if trend.bias_ma5 > 5.0 {
                "🚨 超过5%，严禁追高！"
            } else {
                "✅ 安全范围"
            };
            prompt.push_str(&format!(
                "\n### 趋势预判\n| 指标 | 数值 | 判定 |\n|------|------|------|\n\
                 | 趋势状态 | {} | |\n| 均线排列 | {} | MA5>MA10>MA20为多头 |\n| 趋势强度 | {}/100 | |\n\
                 | **乖离率(MA5)** | **{:+.2}%** | {} |\n| 乖离率(MA10) | {:+.2}% | |\n\
                 | 量能状态 | {} | {} |\n| 系统信号 | {} | |\n| 系统评分 | {}/100 | |\n\n\
                 **买入理由**：\n{}\n\n**风险因素**：\n{}\n",
                opt_text(trend.trend_status.as_deref(), "未知"),
                opt_text(trend.ma_alignment.as_deref(), "未知"),
                trend.trend_strength,
                trend.bias_ma5,
                bias_warning,
                trend.bias_ma10,
                opt_text(trend.volume_status.as_deref(), "未知"),
                opt_text(trend.volume_trend.as_deref(), ""),
                opt_text(trend.buy_signal.as_deref(), "未知"),
                trend.signal_score,
                bullet_list(&trend.signal_reasons),
                bullet_list(&trend.risk_factors),
            ));
        }

        if ctx.volume_change_ratio.is_some() || ctx.price_change_ratio.is_some() {
            prompt.push_str(&format!(
                "\n### 量价变化\n- 成交量较昨日变化：{}倍\n- 价格较昨日变化：{}%\n",
                opt_num(ctx.volume_change_ratio),
                opt_num(ctx.price_change_ratio),
            ));
        }

        prompt.push_str("\n---\n\n## 📰 舆情情报\n");
        match ctx.news_context.as_deref().filter(|_| ctx.has_news()) {
            Some(news) => prompt.push_str(&format!(
                "\n以下是 **{}({})** 近7日的新闻搜索结果，请重点提取风险警报、利好催化和业绩预期：\n\n```\n{}\n```\n",
                name, code, news
            )),
            None => prompt.push_str("\n未搜索到该股票近期的相关新闻。请主要依据技术面数据进行分析。\n"),
        }

        if ctx.data_missing {
            prompt.push_str(
                "\n⚠️ **数据缺失警告**\n当前无法获取完整的行情和技术指标。请忽略表格中的 N/A，\
                 重点依据舆情情报分析；涉及均线、乖离率时直接说明“数据缺失，无法判断”，严禁编造数据。\n",
            );
        }

        prompt.push_str(&format!(
            "\n---\n\n## ✅ 分析任务\n\n请为 **{name}({code})** 生成【决策仪表盘】，严格按照 JSON 格式输出。\n\n\
             如果上方股票名称为\"股票{code}\"或不正确，请在 stock_name 中给出正确的中文全称。\n\n\
             必须明确回答：\n\
             1. 是否满足 MA5>MA10>MA20 多头排列？\n\
             2. 乖离率是否在 5% 以内？超过必须标注\"严禁追高\"\n\
             3. 量能是否配合？\n\
             4. 筹码结构是否健康？\n\
             5. 消息面有无重大利空？\n\n\
             仪表盘须包含一句话核心结论、空仓/持仓分类建议、精确到分的狙击点位，以及用 ✅/⚠️/❌ 标记的检查清单。",
            name = name,
            code = code,
        ));

        prompt
    }
}
