//! Static filter vocabulary for the portal's search facets. The portal does
//! not expose these through any API; the lists mirror what its search UI
//! offers and only change when the product line-up does.

pub const AVAILABLE_PRODUCTS: &[&str] = &[
    "Red Hat Enterprise Linux",
    "Red Hat OpenShift Container Platform",
    "Red Hat Virtualization",
    "Red Hat JBoss Enterprise Application Platform",
    "Red Hat Satellite",
    "Red Hat Ansible Automation Platform",
    "Red Hat OpenStack Platform",
    "Red Hat Ceph Storage",
    "Red Hat Gluster Storage",
    "Red Hat Decision Manager",
    "Red Hat Process Automation Manager",
    "Red Hat Data Grid",
    "Red Hat AMQ",
    "Red Hat Fuse",
    "Red Hat 3scale API Management",
    "Red Hat Single Sign-On",
    "Red Hat OpenShift Dedicated",
    "Red Hat OpenShift Online",
    "Red Hat OpenShift Service on AWS",
    "Red Hat Advanced Cluster Management for Kubernetes",
    "Red Hat Advanced Cluster Security for Kubernetes",
    "Red Hat Quay",
    "Red Hat CodeReady Containers",
    "Red Hat CodeReady Workspaces",
    "Red Hat Integration",
    "Red Hat Runtimes",
    "Red Hat Application Services",
    "Red Hat Middleware",
    "Red Hat Insights",
    "Red Hat Satellite Capsule",
    "Red Hat Directory Server",
    "Red Hat Certificate System",
    "Red Hat Identity Management",
    "Red Hat Enterprise Linux for SAP Solutions",
    "Red Hat Enterprise Linux for Real Time",
    "Red Hat Enterprise Linux for IBM Z",
    "Red Hat Enterprise Linux for Power",
    "Red Hat Enterprise Linux for ARM",
    "Red Hat Software Collections",
    "Red Hat Developer Toolset",
];

pub const DOCUMENT_TYPES: &[&str] = &[
    "Solution",
    "Article",
    "Documentation",
    "Video",
    "Blog",
    "Product Documentation",
    "Knowledgebase",
    "Security Advisory",
    "Bug Fix",
    "Enhancement",
    "Reference Architecture",
    "Technical Brief",
    "White Paper",
    "FAQ",
    "Getting Started",
    "Installation Guide",
    "Administration Guide",
    "Developer Guide",
    "Release Notes",
    "Troubleshooting Guide",
];

pub fn is_known_product(name: &str) -> bool {
    AVAILABLE_PRODUCTS.iter().any(|known| *known == name)
}

pub fn is_known_doc_type(name: &str) -> bool {
    DOCUMENT_TYPES.iter().any(|known| *known == name)
}
