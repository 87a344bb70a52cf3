// Application state for HTTP handlers
use crate::application::analysis_service::AnalysisService;
use crate::application::daily_service::DailyService;
use crate::application::ingestion_service::IngestionService;

#[derive(Clone)]
pub struct AppState {
    pub ingestion_service: IngestionService,
    pub analysis_service: AnalysisService,
    pub daily_service: DailyService,
}
