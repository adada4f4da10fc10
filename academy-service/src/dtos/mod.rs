pub mod academies;
pub mod billing;
pub mod common;
pub mod roster;
pub mod subscription;

pub use academies::{
    CreateAcademyRequest, DirectoryAcademy, DirectoryParams, UpdateAcademyRequest,
};
pub use billing::{
    ChargeListParams, CreateBillingItemRequest, CreateChargeRequest,
    GenerateChargesRequest, IncludeInactiveParams, PayChargeRequest, UpdateBillingItemRequest,
    UpdateChargeRequest,
};
pub use common::{normalize_currency, ListResponse, Pagination};
pub use roster::{
    AthleteListParams, AttendanceParams, CreateAthleteRequest, CreateClassRequest,
    CreateGroupRequest, CreateGuardianRequest, LinkGuardianRequest, MembershipRequest,
    PageParams, RecordAttendanceRequest, UpdateAthleteRequest, UpdateClassRequest,
    UpdateGroupRequest, UpdateGuardianRequest, UpdateMembershipRequest,
};
pub use subscription::{
    NotificationParams, PlanChangeRequest, PlanChangeResponse, PortalRequest, PortalResponse,
    SubscriptionCheckoutRequest, SubscriptionResponse,
};
