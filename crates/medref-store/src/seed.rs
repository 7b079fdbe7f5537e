//! 内置参考数据
//!
//! 台湾常用检验项目（LOINC 对照与成人参考值）以及常见疾病诊疗指引。
//! 数据目录中没有对应快照文件时使用。

use crate::records::*;
use medref_core::models::{LabTestDefinition, ReferenceBand, Sex};

fn lab(
    test_id: &str,
    name_en: &str,
    name_zh: &str,
    alias: &str,
    category: &str,
    specimen: &str,
    unit: &str,
    method: &str,
) -> LabTestDefinition {
    LabTestDefinition {
        test_id: test_id.to_string(),
        name_en: name_en.to_string(),
        name_zh: name_zh.to_string(),
        common_alias: alias.to_string(),
        category: category.to_string(),
        specimen_type: specimen.to_string(),
        unit: unit.to_string(),
        method: method.to_string(),
    }
}

fn adult_band(test_id: &str, sex: Sex, low: f64, high: f64, unit: &str, note: &str) -> ReferenceBand {
    ReferenceBand {
        test_id: test_id.to_string(),
        age_min: 18,
        age_max: 120,
        sex,
        low,
        high,
        unit: unit.to_string(),
        note: note.to_string(),
    }
}

/// 内置检验项目
pub fn lab_tests() -> Vec<LabTestDefinition> {
    vec![
        // 血液常规 (CBC)
        lab("6690-2", "Leukocytes [#/volume] in Blood by Automated count", "白血球計數", "WBC", "血液常規", "全血", "10^3/uL", "自動血球計數儀"),
        lab("789-8", "Erythrocytes [#/volume] in Blood by Automated count", "紅血球計數", "RBC", "血液常規", "全血", "10^6/uL", "自動血球計數儀"),
        lab("718-7", "Hemoglobin [Mass/volume] in Blood", "血紅素", "Hb", "血液常規", "全血", "g/dL", "自動血球計數儀"),
        lab("4544-3", "Hematocrit [Volume Fraction] of Blood by Automated count", "血球容積比", "Hct", "血液常規", "全血", "%", "自動血球計數儀"),
        lab("777-3", "Platelets [#/volume] in Blood by Automated count", "血小板計數", "PLT", "血液常規", "全血", "10^3/uL", "自動血球計數儀"),
        // 血糖
        lab("1558-6", "Fasting glucose [Mass/volume] in Serum or Plasma", "空腹血糖", "AC Sugar, FBS", "生化檢驗-血糖", "血清/血漿", "mg/dL", "酵素法"),
        lab("2345-7", "Glucose [Mass/volume] in Serum or Plasma", "血糖", "Glucose", "生化檢驗-血糖", "血清/血漿", "mg/dL", "酵素法"),
        lab("4548-4", "Hemoglobin A1c/Hemoglobin.total in Blood", "糖化血色素", "HbA1c", "生化檢驗-血糖", "全血", "%", "HPLC"),
        // 血脂
        lab("2093-3", "Cholesterol [Mass/volume] in Serum or Plasma", "總膽固醇", "T-Chol", "生化檢驗-血脂", "血清/血漿", "mg/dL", "酵素法"),
        lab("2571-8", "Triglyceride [Mass/volume] in Serum or Plasma", "三酸甘油酯", "TG", "生化檢驗-血脂", "血清/血漿", "mg/dL", "酵素法"),
        lab("2085-9", "Cholesterol in HDL [Mass/volume] in Serum or Plasma", "高密度脂蛋白膽固醇", "HDL-C", "生化檢驗-血脂", "血清/血漿", "mg/dL", "直接法"),
        lab("2089-1", "Cholesterol in LDL [Mass/volume] in Serum or Plasma", "低密度脂蛋白膽固醇", "LDL-C", "生化檢驗-血脂", "血清/血漿", "mg/dL", "計算法/直接法"),
        // 肝功能
        lab("1742-6", "Alanine aminotransferase [Enzymatic activity/volume] in Serum or Plasma", "丙胺酸轉胺酶", "ALT, GPT", "生化檢驗-肝功能", "血清/血漿", "U/L", "酵素法"),
        lab("1920-8", "Aspartate aminotransferase [Enzymatic activity/volume] in Serum or Plasma", "天門冬胺酸轉胺酶", "AST, GOT", "生化檢驗-肝功能", "血清/血漿", "U/L", "酵素法"),
        lab("1975-2", "Bilirubin.total [Mass/volume] in Serum or Plasma", "總膽紅素", "T-Bil", "生化檢驗-肝功能", "血清/血漿", "mg/dL", "化學法"),
        // 腎功能
        lab("2160-0", "Creatinine [Mass/volume] in Serum or Plasma", "肌酸酐", "Cr", "生化檢驗-腎功能", "血清/血漿", "mg/dL", "Jaffe法/酵素法"),
        lab("3094-0", "Urea nitrogen [Mass/volume] in Serum or Plasma", "尿素氮", "BUN", "生化檢驗-腎功能", "血清/血漿", "mg/dL", "酵素法"),
        lab("33914-3", "Glomerular filtration rate/1.73 sq M.predicted [Volume Rate/Area] in Serum or Plasma by Creatinine-based formula (CKD-EPI)", "腎絲球過濾率", "eGFR", "生化檢驗-腎功能", "血清/血漿", "mL/min/1.73m2", "CKD-EPI 公式計算"),
        // 电解质
        lab("2951-2", "Sodium [Moles/volume] in Serum or Plasma", "鈉離子", "Na", "生化檢驗-電解質", "血清/血漿", "mmol/L", "離子選擇電極法"),
        lab("2823-3", "Potassium [Moles/volume] in Serum or Plasma", "鉀離子", "K", "生化檢驗-電解質", "血清/血漿", "mmol/L", "離子選擇電極法"),
        lab("2075-0", "Chloride [Moles/volume] in Serum or Plasma", "氯離子", "Cl", "生化檢驗-電解質", "血清/血漿", "mmol/L", "離子選擇電極法"),
        // 甲状腺
        lab("3016-3", "Thyrotropin [Units/volume] in Serum or Plasma", "促甲狀腺激素", "TSH", "內分泌-甲狀腺", "血清/血漿", "uIU/mL", "化學冷光免疫分析"),
        lab("3053-6", "Thyroxine (T4) free [Mass/volume] in Serum or Plasma", "游離甲狀腺素", "Free T4", "內分泌-甲狀腺", "血清/血漿", "ng/dL", "化學冷光免疫分析"),
        // 凝血
        lab("5902-2", "Prothrombin time (PT)", "凝血酶原時間", "PT", "凝血功能", "檸檬酸鈉血漿", "sec", "凝固法"),
        lab("6301-6", "INR in Platelet poor plasma by Coagulation assay", "國際標準化比值", "INR", "凝血功能", "檸檬酸鈉血漿", "ratio", "凝固法計算"),
        lab("3173-2", "Activated partial thromboplastin time (aPTT)", "活化部分凝血活酶時間", "aPTT", "凝血功能", "檸檬酸鈉血漿", "sec", "凝固法"),
        // 发炎指标
        lab("1988-5", "C reactive protein [Mass/volume] in Serum or Plasma", "C反應蛋白", "CRP", "發炎指標", "血清/血漿", "mg/dL", "免疫比濁法"),
    ]
}

/// 内置参考值区间（成人）
///
/// 无上限的指标使用 999 作为哨兵上限。2345-7 (随机血糖) 未定义参考值。
pub fn reference_bands() -> Vec<ReferenceBand> {
    use Sex::{Any, Female, Male};
    vec![
        adult_band("6690-2", Any, 4.0, 10.0, "10^3/uL", "成人參考值"),
        adult_band("789-8", Male, 4.5, 5.9, "10^6/uL", "成人男性"),
        adult_band("789-8", Female, 4.0, 5.2, "10^6/uL", "成人女性"),
        adult_band("718-7", Male, 13.5, 17.5, "g/dL", "成人男性"),
        adult_band("718-7", Female, 12.0, 16.0, "g/dL", "成人女性"),
        adult_band("4544-3", Male, 39.0, 52.0, "%", "成人男性"),
        adult_band("4544-3", Female, 36.0, 46.0, "%", "成人女性"),
        adult_band("777-3", Any, 150.0, 400.0, "10^3/uL", "成人參考值"),
        adult_band("1558-6", Any, 70.0, 100.0, "mg/dL", "正常範圍"),
        adult_band("4548-4", Any, 4.0, 5.6, "%", "正常範圍"),
        adult_band("2093-3", Any, 0.0, 200.0, "mg/dL", "理想值"),
        adult_band("2571-8", Any, 0.0, 150.0, "mg/dL", "正常值"),
        adult_band("2085-9", Male, 40.0, 999.0, "mg/dL", "成人男性（越高越好）"),
        adult_band("2085-9", Female, 50.0, 999.0, "mg/dL", "成人女性（越高越好）"),
        adult_band("2089-1", Any, 0.0, 130.0, "mg/dL", "理想值"),
        adult_band("1742-6", Male, 0.0, 40.0, "U/L", "成人男性"),
        adult_band("1742-6", Female, 0.0, 35.0, "U/L", "成人女性"),
        adult_band("1920-8", Any, 0.0, 40.0, "U/L", "成人參考值"),
        adult_band("1975-2", Any, 0.2, 1.2, "mg/dL", "成人參考值"),
        adult_band("2160-0", Male, 0.7, 1.3, "mg/dL", "成人男性"),
        adult_band("2160-0", Female, 0.6, 1.1, "mg/dL", "成人女性"),
        adult_band("3094-0", Any, 7.0, 20.0, "mg/dL", "成人參考值"),
        adult_band("33914-3", Any, 90.0, 999.0, "mL/min/1.73m2", "正常腎功能"),
        adult_band("2951-2", Any, 136.0, 145.0, "mmol/L", "成人參考值"),
        adult_band("2823-3", Any, 3.5, 5.1, "mmol/L", "成人參考值"),
        adult_band("2075-0", Any, 98.0, 107.0, "mmol/L", "成人參考值"),
        adult_band("3016-3", Any, 0.27, 4.2, "uIU/mL", "成人參考值"),
        adult_band("3053-6", Any, 0.93, 1.7, "ng/dL", "成人參考值"),
        adult_band("5902-2", Any, 9.5, 12.5, "sec", "成人參考值"),
        adult_band("6301-6", Any, 0.8, 1.2, "ratio", "未服用抗凝血劑"),
        adult_band("3173-2", Any, 25.0, 35.0, "sec", "成人參考值"),
        adult_band("1988-5", Any, 0.0, 0.5, "mg/dL", "正常值"),
    ]
}

fn step(step_order: i32, kind: &str, description: &str, evidence: &str) -> DiagnosticStepRecord {
    DiagnosticStepRecord {
        step_order,
        recommendation_type: kind.to_string(),
        description: description.to_string(),
        evidence_level: evidence.to_string(),
    }
}

fn med(line: &str, class: &str, examples: &str, dosage: &str, contraindications: &str, evidence: &str) -> MedicationRecord {
    MedicationRecord {
        line_of_therapy: line.to_string(),
        drug_class: class.to_string(),
        examples: examples.to_string(),
        dosage: dosage.to_string(),
        contraindications: contraindications.to_string(),
        evidence_level: evidence.to_string(),
    }
}

fn rec_test(
    category: &str,
    name: &str,
    test_id: Option<&str>,
    frequency: &str,
    indication: &str,
    evidence: &str,
) -> TestRecommendationRecord {
    TestRecommendationRecord {
        category: category.to_string(),
        test_name: name.to_string(),
        test_id: test_id.map(str::to_string),
        frequency: frequency.to_string(),
        indication_text: indication.to_string(),
        evidence_level: evidence.to_string(),
    }
}

fn goal(goal_type: &str, parameter: &str, target: &str, timeframe: &str) -> TreatmentGoalRecord {
    TreatmentGoalRecord {
        goal_type: goal_type.to_string(),
        parameter: parameter.to_string(),
        target_value: target.to_string(),
        timeframe: timeframe.to_string(),
    }
}

/// 内置诊疗指引
pub fn guidelines() -> Vec<GuidelineRecord> {
    vec![
        GuidelineRecord {
            disease_key: "E11".to_string(),
            disease_name_zh: "第二型糖尿病".to_string(),
            disease_name_en: "Type 2 Diabetes Mellitus".to_string(),
            title: "2024 台灣糖尿病臨床照護指引".to_string(),
            source: "中華民國糖尿病學會".to_string(),
            year: Some(2024),
            summary: "本指引涵蓋第二型糖尿病的診斷、血糖控制目標、藥物治療、併發症預防等完整照護建議".to_string(),
            diagnostics: vec![
                step(1, "實驗室檢查", "空腹血糖 ≥126 mg/dL，或隨機血糖 ≥200 mg/dL 合併典型症狀，或HbA1c ≥6.5%", "A"),
                step(2, "確認診斷", "異常結果需重複檢測確認（除非有明顯高血糖症狀）", "A"),
                step(3, "併發症篩檢", "診斷時即應篩檢視網膜病變、腎病變、神經病變", "B"),
            ],
            medications: vec![
                med("第一線", "雙胍類 (Biguanide)", "Metformin", "起始劑量 500mg 每日一次，逐漸增加至 500-1000mg 每日兩次", "腎功能不全 (eGFR <30)", "A"),
                med("第二線", "SGLT2 抑制劑", "Empagliflozin, Dapagliflozin", "依藥品仿單建議劑量", "eGFR <20-30 (依藥品而異)", "A"),
                med("第二線", "GLP-1 受體促效劑", "Dulaglutide, Semaglutide", "皮下注射，每週一次", "甲狀腺髓樣癌病史或家族史", "A"),
                med("第二線", "DPP-4 抑制劑", "Sitagliptin, Linagliptin", "依藥品仿單建議劑量", "無特殊禁忌", "B"),
                med("輔助治療", "胰島素", "長效/速效胰島素", "依血糖控制情況調整劑量", "需注意低血糖風險", "A"),
            ],
            tests: vec![
                rec_test("生化檢驗", "糖化血色素 (HbA1c)", Some("4548-4"), "每3個月", "評估血糖控制", "A"),
                rec_test("生化檢驗", "空腹血糖", Some("1558-6"), "每次回診", "監測血糖", "A"),
                rec_test("生化檢驗", "腎功能 (Cr, eGFR)", Some("2160-0"), "每年至少1次", "篩檢糖尿病腎病變", "A"),
                rec_test("尿液檢驗", "尿液白蛋白/肌酸酐比值", Some("14959-1"), "每年至少1次", "篩檢早期腎病變", "A"),
                rec_test("生化檢驗", "血脂肪 (TC, LDL, HDL, TG)", Some("2093-3"), "每年至少1次", "評估心血管風險", "A"),
                rec_test("其他檢查", "眼底檢查", None, "每年至少1次", "篩檢視網膜病變", "A"),
            ],
            goals: vec![
                goal("血糖控制", "HbA1c", "<7%（一般成人），<8%（老年人或多重共病）", "長期控制目標"),
                goal("血糖控制", "空腹血糖", "80-130 mg/dL", "日常監測目標"),
                goal("血糖控制", "飯後2小時血糖", "<180 mg/dL", "日常監測目標"),
                goal("血壓控制", "血壓", "<140/90 mmHg", "預防心血管併發症"),
                goal("血脂控制", "LDL-C", "<100 mg/dL（高風險 <70 mg/dL）", "預防心血管併發症"),
            ],
        },
        GuidelineRecord {
            disease_key: "I10".to_string(),
            disease_name_zh: "原發性高血壓".to_string(),
            disease_name_en: "Essential Hypertension".to_string(),
            title: "2022 台灣高血壓治療指引".to_string(),
            source: "中華民國心臟學會".to_string(),
            year: Some(2022),
            summary: "本指引提供高血壓的診斷標準、分級、治療目標及藥物選擇建議".to_string(),
            diagnostics: vec![
                step(1, "血壓測量", "診間血壓 ≥140/90 mmHg，或家庭血壓 ≥135/85 mmHg", "A"),
                step(2, "次發性高血壓篩檢", "年輕患者（<40歲）或突發性高血壓應排除次發性原因", "B"),
            ],
            medications: vec![
                med("第一線", "血管收縮素轉換酶抑制劑 (ACEI)", "Enalapril, Ramipril", "起始低劑量，逐步調整", "孕婦、雙側腎動脈狹窄", "A"),
                med("第一線", "血管收縮素受體阻斷劑 (ARB)", "Losartan, Valsartan", "起始低劑量，逐步調整", "孕婦", "A"),
                med("第一線", "鈣離子通道阻斷劑 (CCB)", "Amlodipine, Nifedipine", "長效型為佳", "心臟傳導異常", "A"),
                med("第一線", "利尿劑", "Hydrochlorothiazide", "低劑量使用（12.5-25mg）", "痛風、低血鉀", "A"),
                med("第二線", "乙型阻斷劑 (Beta-blocker)", "Bisoprolol, Carvedilol", "有心臟病或年輕患者優先考慮", "氣喘、心搏過慢", "B"),
            ],
            tests: vec![
                rec_test("生化檢驗", "腎功能 (Cr, eGFR)", Some("2160-0"), "每年至少1次", "評估腎臟損害", "A"),
                rec_test("生化檢驗", "電解質 (Na, K)", Some("2951-2"), "開始利尿劑治療前及定期追蹤", "監測電解質異常", "A"),
                rec_test("心電圖", "靜態心電圖", None, "診斷時及每年追蹤", "評估心臟肥大或缺血", "B"),
                rec_test("尿液檢驗", "尿液檢查", None, "每年至少1次", "篩檢蛋白尿", "B"),
            ],
            goals: vec![goal(
                "血壓控制",
                "血壓",
                "<140/90 mmHg（一般成人），<130/80 mmHg（糖尿病或慢性腎臟病患者）",
                "長期目標",
            )],
        },
        GuidelineRecord {
            disease_key: "E78".to_string(),
            disease_name_zh: "高血脂症".to_string(),
            disease_name_en: "Hyperlipidemia".to_string(),
            title: "2023 台灣血脂異常治療指引".to_string(),
            source: "中華民國血脂及動脈硬化學會".to_string(),
            year: Some(2023),
            summary: "本指引提供血脂異常的診斷、心血管風險評估及降血脂藥物使用建議".to_string(),
            diagnostics: Vec::new(),
            medications: vec![
                med("第一線", "史他汀類 (Statin)", "Atorvastatin, Rosuvastatin", "中至高強度，依心血管風險決定", "活動性肝病、孕婦", "A"),
                med("第二線", "Ezetimibe", "Ezetimibe", "10mg 每日一次，可與 Statin 併用", "無特殊禁忌", "B"),
                med("第二線", "PCSK9 抑制劑", "Evolocumab, Alirocumab", "皮下注射，用於高風險且 Statin 無法達標者", "成本考量", "A"),
                med("其他", "纖維酸類 (Fibrate)", "Fenofibrate", "主要用於高三酸甘油酯", "腎功能不全", "B"),
            ],
            tests: vec![rec_test(
                "生化檢驗",
                "血脂肪 (TC, LDL, HDL, TG)",
                Some("2093-3"),
                "開始治療前及治療4-12週後追蹤",
                "評估治療效果",
                "A",
            )],
            goals: vec![
                goal("血脂控制", "LDL-C", "<100 mg/dL（中風險），<70 mg/dL（高風險），<55 mg/dL（極高風險）", "依心血管風險分層"),
                goal("血脂控制", "三酸甘油酯", "<150 mg/dL", "降低心血管風險"),
                goal("血脂控制", "HDL-C", ">40 mg/dL（男性），>50 mg/dL（女性）", "心血管保護因子"),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_seed_bands_reference_known_tests() {
        let ids: HashSet<_> = lab_tests().into_iter().map(|t| t.test_id).collect();
        assert_eq!(ids.len(), 27);
        assert!(reference_bands().iter().all(|b| ids.contains(&b.test_id)));
    }

    #[test]
    fn test_seed_guideline_keys() {
        let keys: Vec<_> = guidelines().into_iter().map(|g| g.disease_key).collect();
        assert_eq!(keys, vec!["E11", "I10", "E78"]);
    }
}
