//! 查询门面
//!
//! 操作名 → 类型化参数 → 统一响应信封。这里只做分发与信封整形，不含业务逻辑。

use medref_core::models::Sex;
use medref_core::{MedrefError, Resolved, Result};
use medref_resolve::{
    BatchEntry, CodeHierarchyResolver, CodeKind, GuidelineAssembler, HierarchyLimits,
    LabOutcome, LabReferenceResolver, PathwayRules,
};
use medref_store::ReferenceStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

fn default_sex() -> Sex {
    Sex::Any
}

/// 查询请求，以 `op` 字段区分操作
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueryRequest {
    FindChildrenOrSiblings {
        code: String,
    },
    FindNearby {
        code: String,
    },
    CrossReference {
        diagnosis_code: String,
        procedure_code: String,
    },
    SearchCodes {
        keyword: String,
        #[serde(default, alias = "type")]
        kind: CodeKind,
    },
    ResolveBand {
        #[serde(alias = "loinc_code")]
        test_id: String,
        age: u32,
        #[serde(default = "default_sex", alias = "gender")]
        sex: Sex,
    },
    ClassifyValue {
        #[serde(alias = "loinc_code")]
        test_id: String,
        value: f64,
        age: u32,
        #[serde(default = "default_sex", alias = "gender")]
        sex: Sex,
    },
    ClassifyBatch {
        #[serde(alias = "results")]
        entries: Vec<BatchEntry>,
        age: u32,
        #[serde(default = "default_sex", alias = "gender")]
        sex: Sex,
    },
    SearchLabTests {
        keyword: String,
        #[serde(default)]
        category: Option<String>,
    },
    ListLabCategories,
    GetCompleteGuideline {
        #[serde(alias = "icd_code")]
        disease_key: String,
    },
    SuggestClinicalPathway {
        #[serde(alias = "icd_code")]
        disease_key: String,
        #[serde(default)]
        patient_context: Option<Map<String, Value>>,
    },
    GetMedicationRecommendations {
        #[serde(alias = "icd_code")]
        disease_key: String,
    },
    GetTestRecommendations {
        #[serde(alias = "icd_code")]
        disease_key: String,
    },
    GetTreatmentGoals {
        #[serde(alias = "icd_code")]
        disease_key: String,
    },
    SearchGuidelines {
        keyword: String,
    },
    StoreInfo,
}

impl QueryRequest {
    /// 操作名
    pub fn op(&self) -> &'static str {
        match self {
            QueryRequest::FindChildrenOrSiblings { .. } => "find_children_or_siblings",
            QueryRequest::FindNearby { .. } => "find_nearby",
            QueryRequest::CrossReference { .. } => "cross_reference",
            QueryRequest::SearchCodes { .. } => "search_codes",
            QueryRequest::ResolveBand { .. } => "resolve_band",
            QueryRequest::ClassifyValue { .. } => "classify_value",
            QueryRequest::ClassifyBatch { .. } => "classify_batch",
            QueryRequest::SearchLabTests { .. } => "search_lab_tests",
            QueryRequest::ListLabCategories => "list_lab_categories",
            QueryRequest::GetCompleteGuideline { .. } => "get_complete_guideline",
            QueryRequest::SuggestClinicalPathway { .. } => "suggest_clinical_pathway",
            QueryRequest::GetMedicationRecommendations { .. } => "get_medication_recommendations",
            QueryRequest::GetTestRecommendations { .. } => "get_test_recommendations",
            QueryRequest::GetTreatmentGoals { .. } => "get_treatment_goals",
            QueryRequest::SearchGuidelines { .. } => "search_guidelines",
            QueryRequest::StoreInfo => "store_info",
        }
    }
}

/// 响应状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    NotFound,
    NoApplicableRange,
    Error,
}

/// 错误详情
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// 统一响应信封
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub status: ResponseStatus,
    pub op: String,
    pub data: Option<Value>,
    pub error: Option<ErrorBody>,
}

impl QueryResponse {
    fn with_data(status: ResponseStatus, op: &str, data: &impl Serialize) -> Result<Self> {
        Ok(Self {
            status,
            op: op.to_string(),
            data: Some(serde_json::to_value(data)?),
            error: None,
        })
    }

    pub fn ok(op: &str, data: &impl Serialize) -> Result<Self> {
        Self::with_data(ResponseStatus::Ok, op, data)
    }

    pub fn from_resolved<T: Serialize>(op: &str, resolved: Resolved<T>) -> Result<Self> {
        match resolved {
            Resolved::Found(data) => Self::ok(op, &data),
            Resolved::NotFound(nf) => Self::with_data(ResponseStatus::NotFound, op, &nf),
        }
    }

    pub fn from_lab<T: Serialize>(op: &str, outcome: LabOutcome<T>) -> Result<Self> {
        match outcome {
            LabOutcome::Resolved(data) => Self::ok(op, &data),
            LabOutcome::TestNotFound(nf) => Self::with_data(ResponseStatus::NotFound, op, &nf),
            LabOutcome::NoApplicableRange(nar) => {
                Self::with_data(ResponseStatus::NoApplicableRange, op, &nar)
            }
        }
    }

    pub fn error(op: &str, err: &MedrefError) -> Self {
        Self {
            status: ResponseStatus::Error,
            op: op.to_string(),
            data: None,
            error: Some(ErrorBody {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

/// 查询门面，持有三个解析组件
#[derive(Debug, Clone)]
pub struct QueryFacade {
    store: ReferenceStore,
    hierarchy: CodeHierarchyResolver,
    lab: LabReferenceResolver,
    guidelines: GuidelineAssembler,
}

impl QueryFacade {
    pub fn new(store: ReferenceStore) -> Self {
        Self::with_settings(store, HierarchyLimits::default(), PathwayRules::default())
    }

    pub fn with_settings(store: ReferenceStore, limits: HierarchyLimits, rules: PathwayRules) -> Self {
        Self {
            hierarchy: CodeHierarchyResolver::with_limits(store.clone(), limits),
            lab: LabReferenceResolver::new(store.clone()),
            guidelines: GuidelineAssembler::with_rules(store.clone(), rules),
            store,
        }
    }

    pub fn store(&self) -> &ReferenceStore {
        &self.store
    }

    /// 执行请求；故障转为 error 信封，不会向外传播
    pub fn execute(&self, request: QueryRequest) -> QueryResponse {
        let op = request.op();
        debug!("Executing query op {}", op);

        match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                if e.is_store_fault() {
                    error!("Query op {} hit a store fault: {}", op, e);
                } else {
                    warn!("Query op {} failed: {}", op, e);
                }
                QueryResponse::error(op, &e)
            }
        }
    }

    /// 解析一行 JSON 请求并执行
    pub fn execute_json(&self, line: &str) -> QueryResponse {
        match serde_json::from_str::<QueryRequest>(line) {
            Ok(request) => self.execute(request),
            Err(e) => {
                let op = serde_json::from_str::<Value>(line)
                    .ok()
                    .and_then(|v| v.get("op").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_else(|| "unknown".to_string());
                debug!("Rejected malformed request for op {}: {}", op, e);
                QueryResponse::error(&op, &MedrefError::Validation(format!("invalid request: {}", e)))
            }
        }
    }

    fn dispatch(&self, request: QueryRequest) -> Result<QueryResponse> {
        let op = request.op();
        match request {
            QueryRequest::FindChildrenOrSiblings { code } => {
                QueryResponse::ok(op, &self.hierarchy.find_children_or_siblings(&code)?)
            }
            QueryRequest::FindNearby { code } => QueryResponse::ok(op, &self.hierarchy.find_nearby(&code)?),
            QueryRequest::CrossReference {
                diagnosis_code,
                procedure_code,
            } => QueryResponse::ok(
                op,
                &self.hierarchy.cross_reference(&diagnosis_code, &procedure_code)?,
            ),
            QueryRequest::SearchCodes { keyword, kind } => {
                QueryResponse::from_resolved(op, self.hierarchy.search_codes(&keyword, kind)?)
            }
            QueryRequest::ResolveBand { test_id, age, sex } => {
                QueryResponse::from_lab(op, self.lab.resolve_band(&test_id, age, sex)?)
            }
            QueryRequest::ClassifyValue {
                test_id,
                value,
                age,
                sex,
            } => QueryResponse::from_lab(op, self.lab.classify_value(&test_id, value, age, sex)?),
            QueryRequest::ClassifyBatch { entries, age, sex } => {
                QueryResponse::ok(op, &self.lab.classify_batch(&entries, age, sex)?)
            }
            QueryRequest::SearchLabTests { keyword, category } => QueryResponse::from_resolved(
                op,
                self.lab.search_lab_tests(&keyword, category.as_deref())?,
            ),
            QueryRequest::ListLabCategories => QueryResponse::ok(op, &self.lab.list_lab_categories()?),
            QueryRequest::GetCompleteGuideline { disease_key } => {
                QueryResponse::from_resolved(op, self.guidelines.complete_guideline(&disease_key)?)
            }
            QueryRequest::SuggestClinicalPathway {
                disease_key,
                patient_context,
            } => QueryResponse::from_resolved(
                op,
                self.guidelines.suggest_pathway(&disease_key, patient_context)?,
            ),
            QueryRequest::GetMedicationRecommendations { disease_key } => QueryResponse::from_resolved(
                op,
                self.guidelines.medication_recommendations(&disease_key)?,
            ),
            QueryRequest::GetTestRecommendations { disease_key } => {
                QueryResponse::from_resolved(op, self.guidelines.test_recommendations(&disease_key)?)
            }
            QueryRequest::GetTreatmentGoals { disease_key } => {
                QueryResponse::from_resolved(op, self.guidelines.treatment_goals(&disease_key)?)
            }
            QueryRequest::SearchGuidelines { keyword } => {
                QueryResponse::from_resolved(op, self.guidelines.search_guidelines(&keyword)?)
            }
            QueryRequest::StoreInfo => QueryResponse::ok(op, &self.store.info()?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medref_core::models::{DiagnosisCode, ProcedureCode};
    use medref_store::{SnapshotBuilder, SnapshotLoader};
    use serde_json::json;

    fn facade() -> QueryFacade {
        let seeded = SnapshotLoader::builtin().load(1).unwrap();
        let snapshot = SnapshotBuilder::new()
            .diagnoses(vec![
                DiagnosisCode::new("E11.2", "Type 2 diabetes mellitus with kidney complications", "第二型糖尿病，伴有腎臟併發症"),
                DiagnosisCode::new("E11.9", "Type 2 diabetes mellitus without complications", "第二型糖尿病，無併發症"),
                DiagnosisCode::new("I10", "Essential (primary) hypertension", "原發性高血壓"),
            ])
            .procedures(vec![ProcedureCode::new("0DTJ4ZZ", "Resection of Appendix", "闌尾切除術")])
            .lab_tests(seeded.lab_tests().to_vec())
            .reference_bands(
                seeded
                    .lab_tests()
                    .iter()
                    .flat_map(|t| seeded.get_bands_for_test(&t.test_id).to_vec())
                    .collect::<Vec<_>>(),
            )
            .bundles(seeded.bundles().to_vec())
            .build(7);
        QueryFacade::new(ReferenceStore::new(snapshot))
    }

    fn run(facade: &QueryFacade, request: Value) -> QueryResponse {
        facade.execute_json(&request.to_string())
    }

    #[test]
    fn test_children_query() {
        let response = run(&facade(), json!({"op": "find_children_or_siblings", "code": "E11"}));
        assert!(response.is_ok());
        let data = response.data.unwrap();
        assert_eq!(data["tier"], "specializations");
        assert_eq!(data["codes"][0]["code"], "E11.2");
        assert_eq!(data["codes"][1]["code"], "E11.9");
    }

    #[test]
    fn test_resolve_band_with_legacy_argument_names() {
        let response = run(
            &facade(),
            json!({"op": "resolve_band", "loinc_code": "1558-6", "age": 45, "gender": "all"}),
        );
        assert!(response.is_ok());
        let data = response.data.unwrap();
        assert_eq!(data["reference_range"]["low"], 70.0);
        assert_eq!(data["reference_range"]["unit"], "mg/dL");
    }

    #[test]
    fn test_lab_outcome_statuses() {
        let facade = facade();

        let response = run(&facade, json!({"op": "classify_value", "test_id": "1558-6", "value": 126, "age": 50, "sex": "male"}));
        assert_eq!(response.data.unwrap()["flag"], "H");

        let response = run(&facade, json!({"op": "classify_value", "test_id": "9999-9", "value": 1, "age": 50}));
        assert_eq!(response.status, ResponseStatus::NotFound);

        let response = run(&facade, json!({"op": "resolve_band", "test_id": "2345-7", "age": 50}));
        assert_eq!(response.status, ResponseStatus::NoApplicableRange);
        assert_eq!(response.data.unwrap()["test"]["name_zh"], "血糖");
    }

    #[test]
    fn test_batch_query() {
        let response = run(
            &facade(),
            json!({
                "op": "classify_batch",
                "entries": [{"test_id": "bad", "value": 1}, {"test_id": "1558-6", "value": 80}],
                "age": 30,
                "sex": "any"
            }),
        );
        let data = response.data.unwrap();
        assert_eq!(data["total"], 1);
        assert_eq!(data["abnormal_count"], 0);
        assert_eq!(data["skipped"][0]["test_id"], "bad");
    }

    #[test]
    fn test_guideline_queries() {
        let facade = facade();

        let response = run(
            &facade,
            json!({"op": "suggest_clinical_pathway", "icd_code": "E11", "patient_context": {"age": 60}}),
        );
        assert!(response.is_ok());
        let data = response.data.unwrap();
        assert_eq!(data["steps"].as_array().unwrap().len(), 5);
        assert_eq!(data["patient_context"]["age"], 60);

        let response = run(&facade, json!({"op": "get_treatment_goals", "disease_key": "K35"}));
        assert_eq!(response.status, ResponseStatus::NotFound);
        assert_eq!(response.data.unwrap()["query"], "K35");

        let response = run(&facade, json!({"op": "search_guidelines", "keyword": "高血壓"}));
        assert_eq!(response.data.unwrap()["guidelines"][0]["disease_key"], "I10");
    }

    #[test]
    fn test_cross_reference_and_search() {
        let facade = facade();

        let response = run(
            &facade,
            json!({"op": "cross_reference", "diagnosis_code": "I10", "procedure_code": "0DTJ4ZZ"}),
        );
        let data = response.data.unwrap();
        assert_eq!(data["diagnosis"]["status"], "found");
        assert_eq!(data["procedure"]["name_zh"], "闌尾切除術");

        let response = run(&facade, json!({"op": "search_codes", "keyword": "糖尿病", "type": "diagnosis"}));
        let data = response.data.unwrap();
        assert_eq!(data["diagnoses"].as_array().unwrap().len(), 2);
        assert!(data.get("procedures").is_none());
    }

    #[test]
    fn test_batch_keeps_valid_entries_next_to_mistyped_ones() {
        let facade = facade();

        for bad in [json!({"test_id": "1558-6", "value": "abc"}), json!({"test_id": 12345, "value": 80})] {
            let response = run(
                &facade,
                json!({
                    "op": "classify_batch",
                    "entries": [bad, {"test_id": "1558-6", "value": 80}],
                    "age": 30,
                    "sex": "any"
                }),
            );
            assert!(response.is_ok());
            let data = response.data.unwrap();
            assert_eq!(data["total"], 1);
            assert_eq!(data["results"][0]["flag"], "N");
            assert_eq!(data["skipped"][0]["index"], 0);
        }
    }

    #[test]
    fn test_store_info() {
        let response = run(&facade(), json!({"op": "store_info"}));
        let data = response.data.unwrap();
        assert_eq!(data["version"], 7);
        assert_eq!(data["diagnoses"], 3);
        assert_eq!(data["guidelines"], 3);
    }

    #[test]
    fn test_malformed_requests_become_error_envelopes() {
        let facade = facade();

        let response = facade.execute_json("{not json");
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.op, "unknown");

        let response = run(&facade, json!({"op": "resolve_band", "test_id": "1558-6"}));
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.op, "resolve_band");
        assert_eq!(response.error.unwrap().kind, "validation");
    }

    #[test]
    fn test_poisoned_store_surfaces_error_envelope() {
        let facade = QueryFacade::new(ReferenceStore::poisoned());

        for request in [
            json!({"op": "find_nearby", "code": "E11.9"}),
            json!({"op": "resolve_band", "test_id": "1558-6", "age": 45}),
            json!({"op": "classify_batch", "entries": [{"test_id": "1558-6", "value": 80}], "age": 30}),
            json!({"op": "get_complete_guideline", "disease_key": "E11"}),
            json!({"op": "store_info"}),
        ] {
            let response = run(&facade, request);
            assert_eq!(response.status, ResponseStatus::Error);
            assert!(response.data.is_none());
            assert_eq!(response.error.unwrap().kind, "store_fault");
        }
    }

    #[test]
    fn test_store_fault_envelope() {
        let err = MedrefError::StoreFault("reference snapshot lock poisoned".to_string());
        let response = QueryResponse::error("find_nearby", &err);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["kind"], "store_fault");
        assert!(value["data"].is_null());
    }
}
